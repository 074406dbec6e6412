//! Filter groups: nested filter trees drawn as one flat sequence of passes.

use gpuimg_core::{texture_coords, EngineError, FilterKind, Quad, Rotation, CUBE};

use crate::filter::Filter;
use crate::gpu::{Gpu, RenderTarget, TextureId};
use crate::queue::{Command, CommandQueue, CommandSender};

/// Intermediate framebuffers, one per interior pass.
#[derive(Debug, Default)]
struct FramebufferPool {
    slots: Vec<Option<RenderTarget>>,
    size: (i32, i32),
}

impl FramebufferPool {
    fn is_fresh(&self, count: usize, size: (i32, i32)) -> bool {
        self.slots.len() == count && self.size == size
    }

    fn release(&mut self, gpu: &mut dyn Gpu) {
        for target in self.slots.drain(..).flatten() {
            gpu.delete_render_target(target);
        }
    }

    /// Reallocate unless the pool already matches. A slot that cannot be allocated stays
    /// empty and its pass is skipped at draw time.
    fn ensure(&mut self, gpu: &mut dyn Gpu, count: usize, size: (i32, i32)) {
        if self.is_fresh(count, size) {
            return;
        }
        self.release(gpu);
        self.size = size;
        for pass in 0..count {
            let slot = match gpu.create_render_target(size.0, size.1) {
                Ok(target) => Some(target),
                Err(e) => {
                    tracing::warn!(pass, error = %e, "intermediate framebuffer unavailable");
                    None
                }
            };
            self.slots.push(slot);
        }
        if count > 0 {
            tracing::debug!(count, w = size.0, h = size.1, "framebuffer pool allocated");
        }
    }

    fn get(&self, pass: usize) -> Option<RenderTarget> {
        self.slots.get(pass).copied().flatten()
    }

    fn allocated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// An ordered list of filters and nested groups.
///
/// Drawing flattens the tree in pre-order into the merged pass list. Pass `i` renders into
/// intermediate framebuffer `i`, and the last pass renders into whatever the caller bound.
#[derive(Debug)]
pub struct FilterGroup {
    filters: Vec<Box<dyn Filter>>,
    pool: FramebufferPool,
    queue: CommandQueue,
    output: (i32, i32),
    initialized: bool,
    tex_coords: Quad,
    tex_coords_flipped: Quad,
}

impl Default for FilterGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterGroup {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            pool: FramebufferPool::default(),
            queue: CommandQueue::new(),
            output: (0, 0),
            initialized: false,
            tex_coords: texture_coords(Rotation::Normal, false, false),
            tex_coords_flipped: texture_coords(Rotation::Normal, false, true),
        }
    }

    pub fn with_filters(filters: Vec<Box<dyn Filter>>) -> Self {
        let mut group = Self::new();
        group.filters = filters;
        group
    }

    /// Append a child. The merged list and the pool follow on the next draw.
    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn remove_filter(&mut self, index: usize) -> Option<Box<dyn Filter>> {
        (index < self.filters.len()).then(|| self.filters.remove(index))
    }

    /// Direct children.
    pub fn filters(&self) -> &[Box<dyn Filter>] {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut [Box<dyn Filter>] {
        &mut self.filters
    }

    /// Leaves in pre-order; nested groups are inlined and empty groups contribute nothing.
    pub fn merged(&self) -> Vec<&dyn Filter> {
        let mut out = Vec::new();
        collect_leaves(&self.filters, &mut out);
        out
    }

    pub fn merged_len(&self) -> usize {
        self.merged().len()
    }

    /// Intermediate framebuffers currently held.
    pub fn framebuffer_count(&self) -> usize {
        self.pool.allocated()
    }

    fn draw_passes(
        &mut self,
        gpu: &mut dyn Gpu,
        input: Option<TextureId>,
        positions: &Quad,
        tex_coords: &Quad,
    ) {
        let mut leaves = Vec::new();
        collect_leaves_mut(&mut self.filters, &mut leaves);
        let count = leaves.len();
        if count == 0 {
            return;
        }
        self.pool.ensure(gpu, count - 1, self.output);

        // Interior passes without a framebuffer drop out; the last pass always draws.
        let mut plan: Vec<(usize, Option<RenderTarget>)> = Vec::with_capacity(count);
        for (i, leaf) in leaves.iter().enumerate() {
            if i + 1 == count {
                plan.push((i, None));
                continue;
            }
            match self.pool.get(i) {
                Some(target) => plan.push((i, Some(target))),
                None => tracing::warn!(pass = i, filter = leaf.label(), "pass skipped"),
            }
        }

        // Parity counts the passes that actually run.
        let passes = plan.len();
        let final_coords = if passes % 2 == 0 {
            &self.tex_coords_flipped
        } else {
            &self.tex_coords
        };

        let mut previous = input;
        for (step, (i, target)) in plan.into_iter().enumerate() {
            if let Some(target) = target {
                gpu.bind_framebuffer(Some(target.fbo));
                gpu.clear([0.0, 0.0, 0.0, 0.0]);
            }

            let (pass_positions, pass_coords) = if step == 0 {
                (positions, tex_coords)
            } else if step + 1 == passes {
                (&CUBE, final_coords)
            } else {
                (&CUBE, &self.tex_coords)
            };
            leaves[i].on_draw(gpu, previous, pass_positions, pass_coords);

            if let Some(target) = target {
                gpu.bind_framebuffer(None);
                previous = Some(target.tex);
            }
        }
    }
}

fn collect_leaves<'a>(filters: &'a [Box<dyn Filter>], out: &mut Vec<&'a dyn Filter>) {
    for filter in filters {
        match filter.as_group() {
            Some(group) => collect_leaves(&group.filters, out),
            None => out.push(&**filter),
        }
    }
}

fn collect_leaves_mut<'a>(
    filters: &'a mut [Box<dyn Filter>],
    out: &mut Vec<&'a mut dyn Filter>,
) {
    for filter in filters.iter_mut() {
        if filter.as_group().is_some() {
            if let Some(group) = filter.as_group_mut() {
                collect_leaves_mut(&mut group.filters, out);
            }
        } else {
            out.push(&mut **filter);
        }
    }
}

impl Filter for FilterGroup {
    fn kind(&self) -> FilterKind {
        FilterKind::Group
    }

    /// Initializes every child, reporting the first failure after trying them all.
    fn init(&mut self, gpu: &mut dyn Gpu) -> Result<(), EngineError> {
        let mut first_err = None;
        for filter in &mut self.filters {
            if let Err(e) = filter.init(gpu) {
                tracing::error!(filter = filter.label(), error = %e, "filter init failed");
                first_err.get_or_insert(e);
            }
        }
        self.initialized = true;
        first_err.map_or(Ok(()), Err)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn on_output_size_changed(&mut self, gpu: &mut dyn Gpu, w: i32, h: i32) {
        if self.output != (w, h) {
            self.pool.release(gpu);
        }
        self.output = (w, h);
        for filter in &mut self.filters {
            filter.on_output_size_changed(gpu, w, h);
        }
    }

    fn output_size(&self) -> (i32, i32) {
        self.output
    }

    fn prepare(&mut self, gpu: &mut dyn Gpu) {
        for command in self.queue.drain() {
            match command {
                Command::Param { name, .. } | Command::Uniform { name, .. } => {
                    tracing::debug!(%name, "group has no uniforms; command ignored")
                }
                Command::Image(_) => tracing::debug!("group has no image input; command ignored"),
            }
        }
        for filter in &mut self.filters {
            filter.prepare(gpu);
        }
    }

    fn on_draw(
        &mut self,
        gpu: &mut dyn Gpu,
        input: Option<TextureId>,
        positions: &Quad,
        tex_coords: &Quad,
    ) {
        if !self.initialized {
            return;
        }
        self.prepare(gpu);
        self.draw_passes(gpu, input, positions, tex_coords);
    }

    fn destroy(&mut self, gpu: &mut dyn Gpu) {
        self.pool.release(gpu);
        for filter in &mut self.filters {
            filter.destroy(gpu);
        }
        self.initialized = false;
    }

    fn sender(&self) -> CommandSender {
        self.queue.sender()
    }

    fn as_group(&self) -> Option<&FilterGroup> {
        Some(self)
    }

    fn as_group_mut(&mut self) -> Option<&mut FilterGroup> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ShaderFilter;
    use crate::testing::{Call, RecordingGpu};

    fn leaf(label: &str) -> Box<dyn Filter> {
        Box::new(ShaderFilter::passthrough().with_label(label))
    }

    fn group(children: Vec<Box<dyn Filter>>) -> Box<dyn Filter> {
        Box::new(FilterGroup::with_filters(children))
    }

    fn labels(group: &FilterGroup) -> Vec<String> {
        group.merged().iter().map(|f| f.label().to_string()).collect()
    }

    fn draw(group: &mut FilterGroup, gpu: &mut RecordingGpu) {
        let coords = texture_coords(Rotation::Normal, false, false);
        group.on_draw(gpu, Some(TextureId(100)), &CUBE, &coords);
    }

    #[test]
    fn merged_is_preorder_and_skips_empty_groups() {
        let tree = FilterGroup::with_filters(vec![
            leaf("a"),
            group(vec![
                leaf("b"),
                group(vec![]),
                group(vec![leaf("c"), group(vec![leaf("d")])]),
            ]),
            leaf("e"),
        ]);
        assert_eq!(labels(&tree), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn pool_holds_one_less_than_passes() {
        let mut gpu = RecordingGpu::default();
        let mut tree = FilterGroup::with_filters(vec![leaf("a"), group(vec![leaf("b"), leaf("c")])]);
        tree.init(&mut gpu).expect("init");
        tree.on_output_size_changed(&mut gpu, 8, 8);
        draw(&mut tree, &mut gpu);
        assert_eq!(tree.framebuffer_count(), 2);
        assert_eq!(gpu.count(|c| matches!(c, Call::Draw)), 3);
    }

    #[test]
    fn single_or_empty_group_touches_no_framebuffers() {
        for children in [vec![], vec![leaf("only")]] {
            let mut gpu = RecordingGpu::default();
            let mut tree = FilterGroup::with_filters(children);
            tree.init(&mut gpu).expect("init");
            tree.on_output_size_changed(&mut gpu, 8, 8);
            draw(&mut tree, &mut gpu);
            assert_eq!(tree.framebuffer_count(), 0);
            assert_eq!(gpu.framebuffer_calls(), 0);
        }
    }

    #[test]
    fn same_size_resize_keeps_the_pool() {
        let mut gpu = RecordingGpu::default();
        let mut tree = FilterGroup::with_filters(vec![leaf("a"), leaf("b")]);
        tree.init(&mut gpu).expect("init");
        tree.on_output_size_changed(&mut gpu, 8, 8);
        draw(&mut tree, &mut gpu);
        tree.on_output_size_changed(&mut gpu, 8, 8);
        draw(&mut tree, &mut gpu);
        assert_eq!(gpu.count(|c| matches!(c, Call::CreateTarget { .. })), 1);

        tree.on_output_size_changed(&mut gpu, 4, 4);
        assert_eq!(gpu.count(|c| matches!(c, Call::DeleteTarget(_))), 1);
        draw(&mut tree, &mut gpu);
        assert!(gpu
            .calls
            .contains(&Call::CreateTarget { fbo: 5, w: 4, h: 4 }));
    }

    #[test]
    fn final_pass_coordinates_follow_parity() {
        for n in 1..=3usize {
            let mut gpu = RecordingGpu::default();
            let children = (0..n).map(|i| leaf(&i.to_string())).collect();
            let mut tree = FilterGroup::with_filters(children);
            tree.init(&mut gpu).expect("init");
            tree.on_output_size_changed(&mut gpu, 8, 8);
            let caller = texture_coords(Rotation::Rotation90, true, false);
            tree.on_draw(&mut gpu, Some(TextureId(100)), &CUBE, &caller);

            let coords: Vec<Quad> = gpu
                .calls
                .iter()
                .filter_map(|c| match c {
                    Call::EnableAttrib(name, q) if name == "inputTextureCoordinate" => Some(*q),
                    _ => None,
                })
                .collect();
            assert_eq!(coords.len(), n);
            assert_eq!(coords[0], caller);
            if n > 1 {
                let expected = texture_coords(Rotation::Normal, false, n % 2 == 0);
                assert_eq!(coords[n - 1], expected, "n = {n}");
            }
        }
    }

    #[test]
    fn exhausted_pool_skips_the_pass() {
        let mut gpu = RecordingGpu::with_target_budget(1);
        let mut tree = FilterGroup::with_filters(vec![leaf("a"), leaf("b"), leaf("c")]);
        tree.init(&mut gpu).expect("init");
        tree.on_output_size_changed(&mut gpu, 8, 8);
        draw(&mut tree, &mut gpu);
        assert_eq!(tree.framebuffer_count(), 1);
        assert_eq!(gpu.count(|c| matches!(c, Call::Draw)), 2);
        // Two passes ran, so the last one samples with flipped coordinates.
        let coords = tex_coord_streams(&gpu);
        assert_eq!(coords.last(), Some(&texture_coords(Rotation::Normal, false, true)));
    }

    #[test]
    fn first_running_pass_gets_the_caller_geometry() {
        let mut gpu = RecordingGpu::with_target_budget(0);
        let mut tree = FilterGroup::with_filters(vec![leaf("a"), leaf("b")]);
        tree.init(&mut gpu).expect("init");
        tree.on_output_size_changed(&mut gpu, 8, 8);
        let caller = texture_coords(Rotation::Rotation180, false, false);
        tree.on_draw(&mut gpu, Some(TextureId(100)), &CUBE, &caller);

        assert_eq!(gpu.count(|c| matches!(c, Call::Draw)), 1);
        assert_eq!(tex_coord_streams(&gpu), [caller]);
    }

    fn tex_coord_streams(gpu: &RecordingGpu) -> Vec<Quad> {
        gpu.calls
            .iter()
            .filter_map(|c| match c {
                Call::EnableAttrib(name, q) if name == "inputTextureCoordinate" => Some(*q),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn destroy_releases_pool_and_children() {
        let mut gpu = RecordingGpu::default();
        let mut tree = FilterGroup::with_filters(vec![leaf("a"), group(vec![leaf("b")])]);
        tree.init(&mut gpu).expect("init");
        tree.on_output_size_changed(&mut gpu, 8, 8);
        draw(&mut tree, &mut gpu);
        tree.destroy(&mut gpu);

        assert_eq!(gpu.live_targets, 0);
        assert_eq!(gpu.count(|c| matches!(c, Call::DeleteProgram(_))), 2);
        assert!(!tree.is_initialized());
    }
}
