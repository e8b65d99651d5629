pub mod domain_utils;
pub mod encoding_utils;
pub mod header_utils;
