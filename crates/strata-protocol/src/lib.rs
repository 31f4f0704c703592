//! Wire protocol shared by the strata server and clients.
//!
//! - [`messages`]: the message schema and discriminators
//! - [`codec`]: JSON encode/decode with an integer `type` field
//! - [`vector`]: rounded `[x, y, z]` vector adapters
//! - [`kinematics`]: the movement model both sides integrate
//! - [`channel`]: the transport-agnostic inbound/outbound seam

pub mod channel;
pub mod codec;
pub mod kinematics;
pub mod messages;
pub mod vector;

pub use channel::{InboundEvent, MessageSink, PeerId, RecordingSink};
pub use codec::{CodecError, decode, encode};
pub use kinematics::{MotionInput, MotionParams, MotionState, step_motion};
pub use messages::*;
