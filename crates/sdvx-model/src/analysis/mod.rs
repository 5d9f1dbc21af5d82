// Derived gameplay figures: note counts and radar values

mod elapsed;
pub mod notecount;
pub mod radar;

pub use elapsed::ElapsedTime;
pub use notecount::{NoteCounts, count_notes};
pub use radar::{RadarValues, compute_radar};
