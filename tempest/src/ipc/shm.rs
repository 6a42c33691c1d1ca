// System V shared memory segment holding the control record.

use super::protocol::ControlRecord;
use super::{IpcError, Result};
use fnv::FnvHasher;
use std::hash::Hasher;
use std::mem;
use std::ptr::{self, NonNull};

const PERMISSIONS: libc::c_int = 0o660;

/// Derive a System V key from the channel name.
pub fn key_for(name: &str) -> libc::key_t {
    let mut hasher = FnvHasher::default();
    hasher.write(name.as_bytes());
    let key = (hasher.finish() as u32 & 0x7fff_ffff) as libc::key_t;
    // 0 is IPC_PRIVATE
    if key == 0 {
        1
    } else {
        key
    }
}

/// Remove a segment nobody is attached to, e.g. after a crash. Returns whether one was removed.
pub fn remove_ghost(key: libc::key_t) -> Result<bool> {
    let id = unsafe { libc::shmget(key, 0, 0) };
    if id == -1 {
        let error = std::io::Error::last_os_error();
        return match error.raw_os_error() {
            Some(libc::ENOENT) => Ok(false),
            _ => Err(IpcError::Os {
                op: "shmget",
                source: error,
            }),
        };
    }

    if attach_count(id)? == 0 {
        remove(id)?;
        return Ok(true);
    }
    Ok(false)
}

fn attach_count(id: libc::c_int) -> Result<u64> {
    let mut stat: libc::shmid_ds = unsafe { mem::zeroed() };
    if unsafe { libc::shmctl(id, libc::IPC_STAT, &mut stat) } == -1 {
        return Err(IpcError::last_os("shmctl(IPC_STAT)"));
    }
    Ok(stat.shm_nattch as u64)
}

fn remove(id: libc::c_int) -> Result<()> {
    if unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) } == -1 {
        return Err(IpcError::last_os("shmctl(IPC_RMID)"));
    }
    Ok(())
}

/// Attached mapping of the control record.
pub struct SharedSegment {
    id: libc::c_int,
    record: Option<NonNull<ControlRecord>>,
}

unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl SharedSegment {
    /// Create the segment if needed and attach to it. A fresh segment is initialized.
    pub fn attach(key: libc::key_t) -> Result<Self> {
        let size = mem::size_of::<ControlRecord>();
        let mut created = true;
        let exclusive = libc::IPC_CREAT | libc::IPC_EXCL | PERMISSIONS;
        let mut id = unsafe { libc::shmget(key, size, exclusive) };
        if id == -1 {
            created = false;
            id = unsafe { libc::shmget(key, size, PERMISSIONS) };
        }
        if id == -1 {
            return Err(IpcError::last_os("shmget"));
        }

        let address = unsafe { libc::shmat(id, ptr::null(), 0) };
        if address as isize == -1 {
            return Err(IpcError::last_os("shmat"));
        }
        let record = NonNull::new(address as *mut ControlRecord)
            .ok_or_else(|| IpcError::last_os("shmat"))?;

        if created {
            unsafe { ptr::write(record.as_ptr(), ControlRecord::new()) };
        }
        Ok(Self {
            id,
            record: Some(record),
        })
    }

    /// Mutable access to the record.
    ///
    /// # Safety
    /// The caller must hold the channel semaphore for the lifetime of the reference.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn record_mut(&self) -> Option<&mut ControlRecord> {
        self.record.map(|record| &mut *record.as_ptr())
    }

    /// Detach and remove the segment if this was the last attachment.
    pub fn detach(&mut self) -> Result<bool> {
        let record = match self.record.take() {
            Some(record) => record,
            None => return Ok(false),
        };
        if unsafe { libc::shmdt(record.as_ptr() as *const libc::c_void) } == -1 {
            return Err(IpcError::last_os("shmdt"));
        }
        if attach_count(self.id)? == 0 {
            remove(self.id)?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        let _ = self.detach();
    }
}
