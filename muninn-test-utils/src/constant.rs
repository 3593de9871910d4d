//! Shared fixture constants.

/// Device id stamped on factory-built operations.
pub static TEST_DEVICE_ID: &str = "device_test0001";

/// User id stamped on factory-built operations.
pub static TEST_USER_ID: &str = "user_test0001";

/// Festival id stamped on factory-built operations.
pub static TEST_FESTIVAL_ID: &str = "fest_test0001";
