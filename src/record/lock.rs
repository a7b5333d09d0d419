//! Advisory exclusive locking for shared log files.

use std::fs::File;
use std::io;
use std::ops::{Deref, DerefMut};

/// Something that can take and release an exclusive advisory lock.
///
/// Implemented for [`File`] through `fs2`. The lock is advisory: it only
/// excludes other writers that also lock.
pub trait LockFile {
    /// Block until the exclusive lock is held.
    fn lock_exclusive(&self) -> io::Result<()>;

    /// Release the lock.
    fn unlock(&self) -> io::Result<()>;
}

impl LockFile for File {
    fn lock_exclusive(&self) -> io::Result<()> {
        fs2::FileExt::lock_exclusive(self)
    }

    fn unlock(&self) -> io::Result<()> {
        fs2::FileExt::unlock(self)
    }
}

/// In-memory files have a single owner and nothing to exclude.
impl LockFile for io::Cursor<Vec<u8>> {
    fn lock_exclusive(&self) -> io::Result<()> {
        Ok(())
    }

    fn unlock(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Scoped exclusive access to a lockable file.
///
/// The guard dereferences to the file, so the whole critical section runs
/// through it. Dropping the guard unlocks and logs a failure; call
/// [`ExclusiveLock::release`] to observe the unlock result instead.
pub(crate) struct ExclusiveLock<'a, F: LockFile> {
    file: &'a mut F,
    held: bool,
}

impl<'a, F: LockFile> ExclusiveLock<'a, F> {
    /// Block until `file` is exclusively locked.
    pub(crate) fn acquire(file: &'a mut F) -> io::Result<Self> {
        file.lock_exclusive()?;
        Ok(Self { file, held: true })
    }

    /// Release the lock, reporting any unlock error.
    pub(crate) fn release(mut self) -> io::Result<()> {
        self.held = false;
        self.file.unlock()
    }
}

impl<F: LockFile> Deref for ExclusiveLock<'_, F> {
    type Target = F;

    fn deref(&self) -> &F {
        self.file
    }
}

impl<F: LockFile> DerefMut for ExclusiveLock<'_, F> {
    fn deref_mut(&mut self) -> &mut F {
        self.file
    }
}

impl<F: LockFile> Drop for ExclusiveLock<'_, F> {
    fn drop(&mut self) {
        if self.held
            && let Err(e) = self.file.unlock()
        {
            tracing::warn!(error = %e, "failed to release log file lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingLock {
        locks: Cell<u32>,
        unlocks: Cell<u32>,
    }

    impl LockFile for CountingLock {
        fn lock_exclusive(&self) -> io::Result<()> {
            self.locks.set(self.locks.get() + 1);
            Ok(())
        }

        fn unlock(&self) -> io::Result<()> {
            self.unlocks.set(self.unlocks.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_guard_unlocks_on_drop() {
        let mut lock = CountingLock::default();
        {
            let guard = ExclusiveLock::acquire(&mut lock);
            assert!(guard.is_ok());
            if let Ok(guard) = &guard {
                assert_eq!(guard.locks.get(), 1);
                assert_eq!(guard.unlocks.get(), 0);
            }
        }
        assert_eq!(lock.unlocks.get(), 1);
    }

    #[test]
    fn test_release_unlocks_once() {
        let mut lock = CountingLock::default();
        if let Ok(guard) = ExclusiveLock::acquire(&mut lock) {
            assert!(guard.release().is_ok());
        }
        assert_eq!(lock.locks.get(), 1);
        assert_eq!(lock.unlocks.get(), 1);
    }

    #[test]
    fn test_real_file_lock() {
        let file = tempfile::tempfile();
        assert!(file.is_ok());
        let mut file = file.unwrap_or_else(|_| panic!("tempfile"));
        let guard = ExclusiveLock::acquire(&mut file);
        assert!(guard.is_ok());
        if let Ok(guard) = guard {
            assert!(guard.release().is_ok());
        }
    }
}
