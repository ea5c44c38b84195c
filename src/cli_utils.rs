use std::fmt::Display;
use std::process;

/// Logs a fatal error, prints it to stderr and exits with status 1.
pub fn exit_with_error(message: impl Display) -> ! {
    tracing::error!(%message, "fatal");
    eprintln!("crudlifyd: {message}");
    process::exit(1);
}

/// Prints a command line error followed by the usage line and exits with status 2.
pub fn exit_with_usage_error(message: impl Display, usage: &str) -> ! {
    eprintln!("crudlifyd: {message}\n{usage}");
    process::exit(2);
}
