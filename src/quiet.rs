//! Silence the engine's console output for the duration of a call.
//!
//! IQ-TREE prints progress straight to file descriptors 1 and 2, past any
//! buffering in Rust or Python. [`QuietOutput::enter`] points both at the
//! null device and the guard points them back when dropped, on every exit
//! path. Like [`crate::scratch::ScratchDir`] this changes process-wide state
//! and relies on engine calls being serialised.
//!
//! On platforms without `dup`/`dup2` the guard does nothing.

#[cfg(unix)]
mod imp {
    use std::fs::OpenOptions;
    use std::io::{self, Write};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

    use tracing::{trace, warn};

    const TARGETS: [RawFd; 2] = [libc::STDOUT_FILENO, libc::STDERR_FILENO];

    #[derive(Debug)]
    pub struct QuietOutput {
        /// Copies of the original stdout and stderr, closed on drop.
        saved: Vec<(OwnedFd, RawFd)>,
    }

    fn duplicate(fd: RawFd) -> io::Result<OwnedFd> {
        // SAFETY: dup has no memory effects; a non-negative result is a fresh
        // descriptor nobody else owns.
        let copy = unsafe { libc::dup(fd) };
        if copy < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: see above.
        Ok(unsafe { OwnedFd::from_raw_fd(copy) })
    }

    fn point(target: RawFd, at: RawFd) -> io::Result<()> {
        // SAFETY: both descriptors are open for the duration of the call.
        if unsafe { libc::dup2(at, target) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn flush_std() {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }

    impl QuietOutput {
        pub fn enter() -> io::Result<Self> {
            flush_std();
            let devnull = OpenOptions::new().write(true).open("/dev/null")?;
            let mut guard = QuietOutput { saved: Vec::with_capacity(TARGETS.len()) };
            for target in TARGETS {
                let saved = duplicate(target)?;
                // Registered before redirecting so a failure below restores it.
                guard.saved.push((saved, target));
                point(target, devnull.as_raw_fd())?;
            }
            trace!("engine output silenced");
            Ok(guard)
        }
    }

    impl Drop for QuietOutput {
        fn drop(&mut self) {
            flush_std();
            for (saved, target) in self.saved.drain(..) {
                if let Err(e) = point(target, saved.as_raw_fd()) {
                    warn!(error = %e, fd = target, "failed to restore output descriptor");
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    #[derive(Debug)]
    pub struct QuietOutput;

    impl QuietOutput {
        pub fn enter() -> std::io::Result<Self> {
            Ok(QuietOutput)
        }
    }
}

pub use imp::QuietOutput;

#[cfg(all(test, unix))]
mod tests {
    use std::fs::File;
    use std::os::fd::BorrowedFd;
    use std::os::unix::fs::MetadataExt;

    use super::*;
    use crate::iqtree::IqTree;
    use crate::testing::MockEngine;

    fn identity(fd: i32) -> (u64, u64) {
        // SAFETY: the standard descriptors stay open for the whole test run.
        let owned = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned().unwrap();
        let meta = File::from(owned).metadata().unwrap();
        (meta.dev(), meta.ino())
    }

    // The only test that touches descriptors 1 and 2, so nothing races it.
    #[test]
    fn descriptors_point_at_null_device_then_come_back() {
        let null = std::fs::metadata("/dev/null").unwrap();
        let before = (identity(1), identity(2));
        {
            let _quiet = QuietOutput::enter().unwrap();
            assert_eq!(identity(1), (null.dev(), null.ino()));
            assert_eq!(identity(2), (null.dev(), null.ino()));
        }
        assert_eq!((identity(1), identity(2)), before);

        let iq = IqTree::new(MockEngine::new()).with_file_isolation(false);
        assert_eq!(iq.robinson_foulds("(a,b,(c,d));", "(a,c,(b,d));").unwrap(), 2);
        let err = iq.random_tree(2, crate::options::TreeGenMode::Uniform, &Default::default()).unwrap_err();
        assert!(matches!(err, crate::IqTreeError::Engine(_)));
        assert_eq!((identity(1), identity(2)), before);
    }
}
