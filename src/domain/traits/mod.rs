pub mod bot;
pub mod downloader;
pub mod encoder;
pub mod job_sink;

pub use bot::{Bot, BotInfo};
pub use downloader::ComicDownloader;
pub use encoder::PdfEncoder;
pub use job_sink::JobSink;
