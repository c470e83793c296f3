use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::utils::process::Invocation;

const SECTOR_SIZE: u64 = 2048;
const PVD_SECTOR: u64 = 16;
const VOLUME_ID: std::ops::Range<usize> = 40..72;

/// Read the volume id from an ISO9660 primary volume descriptor.
pub fn read_volume_id(iso: &Path) -> Result<String> {
    let bad = |reason: &str| Error::VolumeId {
        path: iso.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut file = File::open(iso).map_err(|e| Error::io(iso, e))?;
    file.seek(SeekFrom::Start(PVD_SECTOR * SECTOR_SIZE))
        .map_err(|e| Error::io(iso, e))?;

    let mut pvd = [0u8; SECTOR_SIZE as usize];
    file.read_exact(&mut pvd)
        .map_err(|_| bad("image is too small to hold a volume descriptor"))?;

    if pvd[0] != 1 || &pvd[1..6] != b"CD001" {
        return Err(bad("no primary volume descriptor at sector 16"));
    }

    let id = String::from_utf8_lossy(&pvd[VOLUME_ID]);
    Ok(id.trim_end_matches([' ', '\0']).to_string())
}

/// The source ISO, loop mounted read-only for the lifetime of this value.
///
/// `unmount` may be called any number of times; the mount is also released
/// on drop so every error path gives it back.
#[derive(Debug)]
pub struct IsoMount {
    iso: PathBuf,
    label: String,
    dir: TempDir,
    /// Release command; the mount point is appended when it runs.
    umount: Invocation,
    mounted: bool,
}

impl IsoMount {
    pub fn mount(iso: &Path) -> Result<Self> {
        let label = read_volume_id(iso)?;
        let dir = tempfile::Builder::new()
            .prefix("mkksiso-mnt-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;

        info!("Mounting {} on {}", iso.display(), dir.path().display());
        Invocation::new("mount", "mount")
            .args(["-o", "loop,ro"])
            .arg_path(iso)
            .arg_path(dir.path())
            .run()
            .map_err(|e| Error::Mount(e.to_string()))?;

        debug!("Volume id of {}: {}", iso.display(), label);
        Ok(Self::attached(iso, label, dir, Invocation::new("umount", "umount")))
    }

    /// Take ownership of a mount that already exists at `dir`.
    pub(crate) fn attached(iso: &Path, label: String, dir: TempDir, umount: Invocation) -> Self {
        Self {
            iso: iso.to_path_buf(),
            label,
            dir,
            umount,
            mounted: true,
        }
    }

    pub fn mount_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }

        info!("Unmounting {}", self.iso.display());
        self.umount
            .clone()
            .arg_path(self.dir.path())
            .run()
            .map_err(|e| Error::Mount(e.to_string()))?;
        self.mounted = false;
        Ok(())
    }
}

impl Drop for IsoMount {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            warn!("Failed to unmount {}: {}", self.iso.display(), e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fake_iso(volume_id: &str) -> NamedTempFile {
        let mut pvd = vec![0u8; SECTOR_SIZE as usize];
        pvd[0] = 1;
        pvd[1..6].copy_from_slice(b"CD001");
        pvd[6] = 1;
        let mut padded = [b' '; 32];
        padded[..volume_id.len()].copy_from_slice(volume_id.as_bytes());
        pvd[VOLUME_ID].copy_from_slice(&padded);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; (PVD_SECTOR * SECTOR_SIZE) as usize]).unwrap();
        file.write_all(&pvd).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_padded_volume_id() {
        let iso = fake_iso("RHEL-8-0-BaseOS-x86_64");
        assert_eq!(read_volume_id(iso.path()).unwrap(), "RHEL-8-0-BaseOS-x86_64");
    }

    #[test]
    fn keeps_inner_spaces() {
        let iso = fake_iso("Fedora 37 x86_64");
        assert_eq!(read_volume_id(iso.path()).unwrap(), "Fedora 37 x86_64");
    }

    #[test]
    fn rejects_non_iso_files() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 40 * 1024]).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_volume_id(file.path()),
            Err(Error::VolumeId { .. })
        ));
    }

    #[test]
    fn rejects_truncated_files() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"short").unwrap();
        file.flush().unwrap();
        assert!(read_volume_id(file.path()).is_err());
    }

    /// A mount whose release appends the mount point to `log`. The script
    /// is run through `sh` so it is never executed while open for writing.
    pub(crate) fn logged_mount(dir: &Path, log: &Path) -> IsoMount {
        let script = dir.join("umount.sh");
        fs::write(&script, format!("echo \"$1\" >> '{}'\n", log.display())).unwrap();
        IsoMount::attached(
            Path::new("/in.iso"),
            "LABEL".into(),
            TempDir::new().unwrap(),
            Invocation::new("umount", "sh").arg_path(&script),
        )
    }

    pub(crate) fn release_count(log: &Path) -> usize {
        fs::read_to_string(log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn unmount_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("umount.log");
        let mut mount = logged_mount(temp.path(), &log);
        let mount_dir = mount.mount_dir().to_path_buf();

        mount.unmount().unwrap();
        mount.unmount().unwrap();
        drop(mount);

        assert_eq!(release_count(&log), 1);
        assert_eq!(
            fs::read_to_string(&log).unwrap().trim_end(),
            mount_dir.display().to_string()
        );
    }

    #[test]
    fn drop_releases_a_live_mount() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("umount.log");
        drop(logged_mount(temp.path(), &log));
        assert_eq!(release_count(&log), 1);
    }

    #[test]
    fn failed_release_stays_mounted_and_drop_does_not_panic() {
        let mut mount = IsoMount::attached(
            Path::new("/in.iso"),
            "LABEL".into(),
            TempDir::new().unwrap(),
            Invocation::new("umount", "false"),
        );
        assert!(matches!(mount.unmount(), Err(Error::Mount(_))));
        assert!(matches!(mount.unmount(), Err(Error::Mount(_))));
        drop(mount);
    }
}
