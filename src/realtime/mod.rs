pub mod bus;
pub mod event;
pub mod sse;
pub mod subscription;

pub use bus::{EventCallback, PushSink, RealtimeBus, Subscription};
pub use event::{ChangeAction, DataChangeEvent, PushMessage};
pub use sse::{PushConnector, PushStream, SseConnector, SseDecoder, encode_frame};
pub use subscription::{ConnectionState, RealtimeSubscription};
