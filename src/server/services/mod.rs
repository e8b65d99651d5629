pub mod edge_services;
pub mod link_cache_services;
pub mod link_resolver_services;
pub mod throttle_services;
pub mod transform_services;
pub mod upstream_services;

pub use link_cache_services::DynLinkCacheService;
pub use link_resolver_services::DynLinkResolverService;
