pub mod config;
pub mod error;
pub mod image_gen;
pub mod media;
pub mod multipart;
pub mod openrouter;
pub mod preprocess;
pub mod video;
pub mod vision;

pub use error::MediaGenError;

/// Sets up `pretty_env_logger`, showing `info` and above unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
