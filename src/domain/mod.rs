// Domain layer - Plain data types shared by every other layer
pub mod frame;
pub mod location;
pub mod mission;
pub mod plot;
pub mod selection;
pub mod series;
