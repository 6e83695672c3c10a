// No-op stand-ins for the `tracing` event macros used by this crate. The
// arguments are never evaluated.

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => {};
}

#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {};
}
