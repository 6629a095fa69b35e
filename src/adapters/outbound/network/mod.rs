/// Network adapters for third-party metadata endpoints
mod crates_io;
mod github_advisories;
mod hibp;
mod http_signal_source;
mod npm_registry;
mod npms_io;
mod reqwest_transport;
mod signal_fetcher;

pub use crates_io::{CratesIoEndpoint, CratesIoQualityEndpoint, DEFAULT_CRATES_IO_URL};
pub use github_advisories::{
    GithubAdvisoryEndpoint, DEFAULT_GITHUB_GRAPHQL_URL, MAX_GITHUB_PAGE_SIZE,
};
pub use hibp::{HibpEndpoint, DEFAULT_HIBP_URL};
pub use http_signal_source::HttpSignalSource;
pub use npm_registry::{NpmRegistryEndpoint, DEFAULT_NPM_REGISTRY_URL};
pub use npms_io::{NpmsIoEndpoint, DEFAULT_NPMS_IO_URL, MAX_NPMS_BATCH};
pub use reqwest_transport::{ReqwestTransport, DEFAULT_TIMEOUT_SECS};
pub use signal_fetcher::{
    FetchSettings, Page, PagedSignalEndpoint, ParsedChunk, SignalEndpoint, SignalFetcher,
};
