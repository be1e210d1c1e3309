pub mod queue_display;

pub use queue_display::{format_duration, render_play_queue, QUEUE_ITEMS_PER_MESSAGE};
