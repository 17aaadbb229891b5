pub mod console;
pub mod html;
pub mod markdown;
pub mod summary;

pub use html::write_html;
pub use summary::RenderModel;
