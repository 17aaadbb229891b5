pub mod golden;

pub use golden::GoldenAnswerCache;
