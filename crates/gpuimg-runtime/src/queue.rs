//! Deferred "run on draw" commands.
//!
//! Setters on any thread only enqueue; the render thread drains the queue right before the
//! owning filter draws. Each command is applied at most once, in send order.

use std::borrow::Cow;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use image::RgbaImage;

use crate::gpu::UniformValue;

/// One deferred state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Write a shader uniform.
    Uniform {
        name: Cow<'static, str>,
        value: UniformValue,
    },
    /// A filter-level parameter that is not a uniform by itself (e.g. a texel ratio that
    /// derives per-pass uniforms). Plain shader filters treat it as a float uniform.
    Param {
        name: Cow<'static, str>,
        value: f32,
    },
    /// Replace a secondary input image.
    Image(Arc<RgbaImage>),
}

/// Producer half. Cheap to clone and safe to send to other threads.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    pub fn send(&self, command: Command) {
        // The receiver is gone only after the filter itself was dropped.
        if self.tx.send(command).is_err() {
            tracing::debug!("command dropped: filter no longer exists");
        }
    }

    pub fn set_uniform(&self, name: impl Into<Cow<'static, str>>, value: UniformValue) {
        self.send(Command::Uniform {
            name: name.into(),
            value,
        });
    }

    pub fn set_int(&self, name: impl Into<Cow<'static, str>>, value: i32) {
        self.set_uniform(name, UniformValue::Int(value));
    }

    pub fn set_float(&self, name: impl Into<Cow<'static, str>>, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_vec2(&self, name: impl Into<Cow<'static, str>>, value: [f32; 2]) {
        self.set_uniform(name, UniformValue::Vec2(value));
    }

    pub fn set_vec3(&self, name: impl Into<Cow<'static, str>>, value: [f32; 3]) {
        self.set_uniform(name, UniformValue::Vec3(value));
    }

    pub fn set_vec4(&self, name: impl Into<Cow<'static, str>>, value: [f32; 4]) {
        self.set_uniform(name, UniformValue::Vec4(value));
    }

    pub fn set_float_array(&self, name: impl Into<Cow<'static, str>>, value: Vec<f32>) {
        self.set_uniform(name, UniformValue::FloatArray(value));
    }

    pub fn set_mat3(&self, name: impl Into<Cow<'static, str>>, value: [f32; 9]) {
        self.set_uniform(name, UniformValue::Mat3(value));
    }

    pub fn set_mat4(&self, name: impl Into<Cow<'static, str>>, value: [f32; 16]) {
        self.set_uniform(name, UniformValue::Mat4(value));
    }

    pub fn set_param(&self, name: impl Into<Cow<'static, str>>, value: f32) {
        self.send(Command::Param {
            name: name.into(),
            value,
        });
    }

    pub fn set_image(&self, image: RgbaImage) {
        self.send(Command::Image(Arc::new(image)));
    }
}

/// Consumer half, owned by a filter on the render thread.
#[derive(Debug)]
pub struct CommandQueue {
    tx: Sender<Command>,
    rx: Receiver<Command>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, command: Command) {
        // `rx` lives in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(command);
    }

    /// Takes every command queued so far, oldest first.
    pub fn drain(&self) -> Vec<Command> {
        self.rx.try_iter().collect()
    }
}
