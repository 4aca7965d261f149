//! Frame-by-node field data model shared by the extraction adapters and the
//! matrix assembler.

mod field;
mod frame;
mod matrix;

pub use field::{
    FieldRow, NodeId, NodeValue, ParseReduceMethodError, Position, RawFrame, RawSample, ReduceMethod,
};
pub use frame::{Frame, FrameKey, StepNameRegistry};
pub use matrix::{FieldMatrix, MatrixRow, MatrixShapeError};
