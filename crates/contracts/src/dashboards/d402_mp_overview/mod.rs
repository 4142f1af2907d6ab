mod dto;
mod view;

pub use dto::*;
pub use view::*;
