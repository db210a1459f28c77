//! Constants used throughout the console

use std::time::Duration;

/// Interval between progress dots while a command is pending, in milliseconds
pub const PROGRESS_DOT_INTERVAL_MS: u64 = 500;

/// Delay before fetching the newest image after a camera run, in milliseconds
pub const IMAGE_FETCH_DELAY_MS: u64 = 500;

/// Default timeout for backend requests, in milliseconds
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Added to the longest test duration to get the continuous interval, in milliseconds
pub const CONTINUOUS_BUFFER_MS: u64 = 1_000;

/// How long a notice stays visible
pub const NOTICE_LIFETIME: Duration = Duration::from_secs(4);

/// Marker printed by the camera client once the image is stored
pub const CAMERA_DONE_MARKER: &str = "Done, exiting";

/// Name of the loopback client interface; selects the user server list
pub const LOOPBACK_CLIENT: &str = "lo";

/// Notice shown when leaving the bandwidth tab stops continuous testing
pub const CONTINUOUS_DISABLED_TEXT: &str = "Continuous testing disabled.";
