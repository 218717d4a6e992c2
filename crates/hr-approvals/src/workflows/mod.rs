pub mod approval;
pub mod offer;
