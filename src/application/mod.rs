// Application layer - Use cases and the plotting pipeline
pub mod downsampler;
pub mod fetcher;
pub mod locations_job;
pub mod metadata;
pub mod mission_service;
pub mod plot_assembler;
pub mod plot_service;
pub mod progress;
pub mod request_slots;
pub mod resampler;
pub mod tabledap_source;
pub mod trajectory_map;
