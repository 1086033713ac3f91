pub mod keypoint;
pub mod mock;

pub use keypoint::{Joint, JointIndex, JointObservation, Point};
pub use mock::{MockForm, MockSquatGenerator};
