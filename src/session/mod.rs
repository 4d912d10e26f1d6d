//! Per-container strategies feeding the merged output.
//!
//! - [`StreamSession`] keeps a continuous stats stream open for one container and reduces
//!   its samples over a window.
//! - [`PullEntry`] is the lightweight registration of a container in pull mode. A single
//!   poller walks all entries on a timer and requests one snapshot per container.
mod poll;
mod stream;

pub use poll::PullEntry;
pub(crate) use poll::{PullTarget, run_poller};
pub use stream::StreamSession;
