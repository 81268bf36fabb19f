pub mod background;
pub mod box_processor;
pub mod foreground;
pub mod frame;
pub mod rect;
pub mod source;
pub mod utils;
