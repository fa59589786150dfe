// Infrastructure layer - External dependencies and adapters
pub mod chunked_stream;
pub mod config;
pub mod csv_frame;
pub mod erddap_client;
pub mod http_response;
pub mod location_store;
pub mod mission_cache;
pub mod series_cache;
pub mod tabledap_query;
