// Downloader backends

pub mod cobalt;
pub mod innertube;
pub mod ytdlp;

pub use cobalt::CobaltBackend;
pub use innertube::InnertubeBackend;
pub use ytdlp::YtDlpBackend;
