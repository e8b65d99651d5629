mod proxy_host_extractor;

pub use proxy_host_extractor::*;
