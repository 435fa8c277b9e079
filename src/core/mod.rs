pub mod channel;
pub mod frame;

pub use channel::{is_hidden_channel, short_name, Bounds, ChannelBounds, ChannelSet, LimitState};
pub use frame::{ChannelData, Frame, Payload, SampleValue};
