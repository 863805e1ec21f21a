//! Caller-supplied callbacks for progress and warnings

/// Receives `(bytes_done, total_bytes)` during a pass.
pub enum ProgressHook<'a> {
    Noop,
    Report(Box<dyn FnMut(u64, u64) + 'a>),
}

impl<'a> ProgressHook<'a> {
    pub fn report(f: impl FnMut(u64, u64) + 'a) -> Self {
        Self::Report(Box::new(f))
    }

    pub fn emit(&mut self, done: u64, total: u64) {
        if let Self::Report(f) = self {
            f(done, total);
        }
    }
}

/// Receives non-fatal problems found in the bitstream.
pub enum WarningHook<'a> {
    Noop,
    Report(Box<dyn FnMut(&str) + 'a>),
}

impl<'a> WarningHook<'a> {
    pub fn report(f: impl FnMut(&str) + 'a) -> Self {
        Self::Report(Box::new(f))
    }

    pub fn emit(&mut self, message: &str) {
        if let Self::Report(f) = self {
            f(message);
        }
    }
}

pub struct Hooks<'a> {
    pub progress: ProgressHook<'a>,
    pub warning: WarningHook<'a>,
}

impl<'a> Hooks<'a> {
    pub fn silent() -> Self {
        Self {
            progress: ProgressHook::Noop,
            warning: WarningHook::Noop,
        }
    }

    pub fn with_progress(mut self, f: impl FnMut(u64, u64) + 'a) -> Self {
        self.progress = ProgressHook::report(f);
        self
    }

    pub fn with_warning(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.warning = WarningHook::report(f);
        self
    }
}

impl Default for Hooks<'_> {
    fn default() -> Self {
        Self::silent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hooks_forward_calls() {
        let mut progress = Vec::new();
        let mut warnings = Vec::new();
        {
            let mut hooks = Hooks::silent()
                .with_progress(|done, total| progress.push((done, total)))
                .with_warning(|msg| warnings.push(msg.to_string()));
            hooks.progress.emit(10, 100);
            hooks.warning.emit("bad picture");
        }
        assert_eq!(progress, vec![(10, 100)]);
        assert_eq!(warnings, vec!["bad picture".to_string()]);
    }

    #[test]
    fn test_silent_hooks_do_nothing() {
        let mut hooks = Hooks::default();
        hooks.progress.emit(1, 2);
        hooks.warning.emit("ignored");
        assert!(matches!(hooks.progress, ProgressHook::Noop));
    }
}
