mod http_processor;

pub use http_processor::HttpProcessorClient;
