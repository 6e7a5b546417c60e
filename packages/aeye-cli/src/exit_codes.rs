pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INVALID_ARGS: i32 = 2;
pub const DEVICE_ERROR: i32 = 3;

use aeye_gaze::GazeError;

/// Exit code for a failed command
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<GazeError>() {
        Some(GazeError::Startup { .. }) | Some(GazeError::Device(_)) => DEVICE_ERROR,
        Some(GazeError::InvalidConfig(_))
        | Some(GazeError::ConfigNotFound(_))
        | Some(GazeError::ConfigParse(_)) => INVALID_ARGS,
        _ => EXECUTION_ERROR,
    }
}

/// Print `err` with its context chain and return its exit code
pub fn report(err: anyhow::Error) -> i32 {
    eprintln!("Error: {:#}", err);
    for_error(&err)
}
