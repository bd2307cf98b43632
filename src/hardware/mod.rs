//! Hardware access: serial plumbing, capability traits and the ROT2Prog driver.

pub mod capabilities;
pub mod mock_serial;
pub mod rot2prog;
pub mod serial;
