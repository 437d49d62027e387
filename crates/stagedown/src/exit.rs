//! Process termination used by the force-kill path.

/// Terminates the process with a status code.
///
/// The coordinator calls this when the force-kill window elapses. The
/// default, [`ProcessExit`], really exits; tests substitute a closure to
/// observe the forced exit instead.
pub trait ExitHook: Send + Sync {
    fn exit(&self, code: i32);
}

/// Exits the process through [`std::process::exit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl ExitHook for ProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

impl<F> ExitHook for F
where
    F: Fn(i32) + Send + Sync,
{
    fn exit(&self, code: i32) {
        self(code)
    }
}
