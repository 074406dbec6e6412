use std::fmt;
use std::path::PathBuf;

/// Engine-level errors used across gpuimg crates.
///
/// Contract rule: this type lives in `gpuimg-core` and is re-exported by runtimes and backends.
#[derive(Debug)]
pub enum EngineError {
    // ---- Config ----
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    InvalidConfig {
        path: PathBuf,
        msg: String,
    },

    // ---- Backend ----
    VertexCompile(String),
    FragmentCompile(String),
    Link(String),
    GlCreate(String),
    FramebufferIncomplete(u32),
    Unsupported(String),

    // ---- Façade ----
    RenderThread(String),

    // ---- Fallback ----
    Other(String),
}

impl EngineError {
    pub fn other<T: Into<String>>(s: T) -> Self {
        EngineError::Other(s.into())
    }

    /// True for errors raised while building a shader program.
    pub fn is_shader_error(&self) -> bool {
        matches!(
            self,
            EngineError::VertexCompile(_) | EngineError::FragmentCompile(_) | EngineError::Link(_)
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io { path, source } => {
                write!(f, "io error at {}: {}", path.display(), source)
            }
            EngineError::Json { path, source } => {
                write!(f, "json parse error at {}: {}", path.display(), source)
            }
            EngineError::InvalidConfig { path, msg } => {
                write!(f, "invalid config at {}: {}", path.display(), msg)
            }

            EngineError::VertexCompile(msg) => write!(f, "vertex shader compile error: {msg}"),
            EngineError::FragmentCompile(msg) => write!(f, "fragment shader compile error: {msg}"),
            EngineError::Link(msg) => write!(f, "program link error: {msg}"),
            EngineError::GlCreate(msg) => write!(f, "backend object creation failed: {msg}"),
            EngineError::FramebufferIncomplete(status) => {
                write!(f, "framebuffer incomplete (status 0x{status:x})")
            }
            EngineError::Unsupported(msg) => write!(f, "unsupported backend: {msg}"),

            EngineError::RenderThread(msg) => write!(f, "render thread: {msg}"),

            EngineError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io { source, .. } => Some(source),
            EngineError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}
