/*!
 * Pipeline Module
 * The continuation pipeline executor and its builder
 */

mod builder;
mod executor;
mod outcome;

pub use builder::PipelineBuilder;
pub use executor::PipelineExecutor;
pub use outcome::{Dispatch, Outcome};
