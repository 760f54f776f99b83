pub mod connector;
pub mod date_utils;
pub mod decimal_utils;
pub mod logger;
