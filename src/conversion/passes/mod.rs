mod inlining;
mod partitioning;
mod typing;

pub use inlining::*;
pub use partitioning::*;
pub use typing::*;

use crate::errors::Error;
use crate::refs::RefBody;

/// Transformation applied to a freshly converted ref body
pub trait PostProcessor: Send + Sync {
    /// Short name, for logging
    fn name(&self) -> &'static str;

    fn process(&self, body: &mut RefBody) -> Result<(), Error>;
}

/// Ordered list of post-processing passes
pub struct Pipeline {
    passes: Vec<Box<dyn PostProcessor>>,
}

impl Pipeline {
    /// Pipeline which leaves bodies untouched
    pub fn new() -> Pipeline {
        Pipeline { passes: vec![] }
    }

    /// Inlining of direct reuses, then local partitioning, then local typing
    pub fn standard() -> Pipeline {
        Pipeline::new()
            .with(DirectReuseInlining)
            .with(LocalPartitioning)
            .with(LocalTyping)
    }

    /// Add a pass at the end of the pipeline
    pub fn with(mut self, pass: impl PostProcessor + 'static) -> Pipeline {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(&self, body: &mut RefBody) -> Result<(), Error> {
        for pass in &self.passes {
            log::debug!(
                "Running {} over {} statements",
                pass.name(),
                body.statements.len()
            );
            pass.process(body)?;
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::standard()
    }
}
