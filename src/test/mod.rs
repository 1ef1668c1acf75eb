mod roundtrip;

pub use builder::{rsds, ImageFixture};
