//! Already-parsed process models as consumed by the engine.

pub mod builder;
pub mod element;
pub mod process;

pub use builder::ProcessBuilder;
pub use element::{
    BpmnElementType, CatchEventKind, EventDefinition, ExecutableCatchEvent, ExecutableElement,
    SequenceFlow,
};
pub use process::ExecutableProcess;
