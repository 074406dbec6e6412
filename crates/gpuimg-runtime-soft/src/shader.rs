//! Declaration scanning. The soft backend never interprets GLSL bodies; it only needs the
//! names a program declares so locations behave like a real driver's.

/// Names declared with `qualifier` (`attribute`, `uniform`), in source order.
pub(crate) fn declared<'a>(source: &'a str, qualifier: &str) -> Vec<&'a str> {
    source
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix(qualifier)?;
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let name = rest.trim().trim_end_matches(';').split_whitespace().last()?;
            name.split('[').next()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuimg_filters::blend::ALPHA_BLEND_FRAGMENT_SHADER;
    use gpuimg_runtime::TWO_INPUT_VERTEX_SHADER;

    #[test]
    fn finds_attributes_in_order() {
        assert_eq!(
            declared(TWO_INPUT_VERTEX_SHADER, "attribute"),
            ["position", "inputTextureCoordinate", "inputTextureCoordinate2"]
        );
    }

    #[test]
    fn uniforms_skip_precision_and_consts() {
        assert_eq!(
            declared(ALPHA_BLEND_FRAGMENT_SHADER, "uniform"),
            ["inputImageTexture", "inputImageTexture2", "mixturePercent"]
        );
        assert_eq!(declared("uniform float weights[5];\nuniformity x;", "uniform"), ["weights"]);
    }
}
