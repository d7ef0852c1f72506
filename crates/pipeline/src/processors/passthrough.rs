//! Small utility processors

use async_trait::async_trait;
use voicebot_core::{Frame, FrameDirection, FrameProcessor, ProcessorContext, Result};

/// Forwards every frame unchanged
pub struct PassthroughProcessor {
    name: &'static str,
}

impl PassthroughProcessor {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl FrameProcessor for PassthroughProcessor {
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        ctx.push(frame, direction).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Only passes frames matching a predicate; the rest are dropped
pub struct FilterProcessor<F>
where
    F: Fn(&Frame) -> bool + Send + 'static,
{
    name: &'static str,
    predicate: F,
}

impl<F> FilterProcessor<F>
where
    F: Fn(&Frame) -> bool + Send + 'static,
{
    pub fn new(name: &'static str, predicate: F) -> Self {
        Self { name, predicate }
    }
}

#[async_trait]
impl<F> FrameProcessor for FilterProcessor<F>
where
    F: Fn(&Frame) -> bool + Send + Sync + 'static,
{
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        if (self.predicate)(&frame) {
            ctx.push(frame, direction).await
        } else {
            tracing::trace!(processor = self.name, frame = frame.name(), "Frame filtered");
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Transforms each frame in place
pub struct MapProcessor<F>
where
    F: Fn(Frame) -> Frame + Send + 'static,
{
    name: &'static str,
    mapper: F,
}

impl<F> MapProcessor<F>
where
    F: Fn(Frame) -> Frame + Send + 'static,
{
    pub fn new(name: &'static str, mapper: F) -> Self {
        Self { name, mapper }
    }
}

#[async_trait]
impl<F> FrameProcessor for MapProcessor<F>
where
    F: Fn(Frame) -> Frame + Send + Sync + 'static,
{
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        ctx.push((self.mapper)(frame), direction).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
