//! Residual network building blocks
//!
//! The backbone is split in two: a [`Base`] (stem plus `layer1`) shared by
//! all students, and one [`Student`] tail (`layer2`..`layer4`, pooling and
//! classifier) per student. [`ChannelSchedule`] decides how much narrower each
//! successive student is.

mod base;
mod block;
mod preset;
mod schedule;
mod stage;
mod student;

pub use base::{Base, INPUT_CHANNELS, STEM_WIDTH};
pub use block::{conv1x1, conv3x3, BasicBlock, Block, BlockKind, BlockParams, Bottleneck, Downsample};
pub use preset::{Backbone, BackboneSpec};
pub use schedule::{ChannelSchedule, DEFAULT_STAGE_WIDTHS};
pub use stage::{Stage, StageBuilder};
pub use student::{Student, StudentOutput};
