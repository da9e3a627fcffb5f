//! Bundle extraction: materializes the embedded engine binaries, shared
//! library, and shared data files into a private working directory.
//!
//! Extraction is idempotent — re-running against the same destination
//! overwrites or reuses what is there, so a prior partial extraction never
//! requires manual cleanup. The environment the spawned engine needs
//! (library search path, shared data directory) is carried on
//! [`EngineLayout`] and applied per spawned command, never mutated
//! process-globally.

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rust_embed::RustEmbed;

use crate::error::EngineError;

/// Embedded engine bundle. Populated by the packaging step; an empty
/// folder compiles fine and surfaces `Extraction` errors at runtime.
#[derive(RustEmbed)]
#[folder = "embed/"]
struct EngineAssets;

/// Environment variable pointing at a system `postgres` binary. When set,
/// extraction is skipped entirely and sibling binaries are resolved next
/// to it.
pub const SYSTEM_POSTGRES_ENV: &str = "SQLDOCK_POSTGRES_BIN";

/// Paths to everything needed to run the engine, plus the environment its
/// processes must see.
#[derive(Debug, Clone)]
pub struct EngineLayout {
    /// Extraction root; `None` when using system binaries (nothing to clean).
    pub root: Option<PathBuf>,
    pub postgres: PathBuf,
    pub initdb: PathBuf,
    pub pg_ctl: Option<PathBuf>,
    pub lib_dir: Option<PathBuf>,
    pub share_dir: Option<PathBuf>,
}

impl EngineLayout {
    /// Environment entries for spawned engine commands.
    pub fn command_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(share) = &self.share_dir {
            env.push(("PGSHAREDIR".to_string(), share.display().to_string()));
        }
        if let Some(lib) = &self.lib_dir {
            env.push(("PKGLIBDIR".to_string(), lib.display().to_string()));
            env.push((lib_path_env_var().to_string(), lib.display().to_string()));
        }
        env
    }

    /// Remove the transient extraction directory. Safe to call repeatedly;
    /// the persisted data directory is untouched.
    pub fn cleanup(&self) {
        if let Some(root) = &self.root {
            if let Err(e) = std::fs::remove_dir_all(root) {
                debug!("Failed to remove extraction directory {}: {}", root.display(), e);
            }
        }
    }
}

fn bin_ext() -> &'static str {
    if cfg!(windows) {
        ".exe"
    } else {
        ""
    }
}

fn shared_lib_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "libpq.5.dylib"
    } else if cfg!(windows) {
        "libpq-5.dll"
    } else {
        "libpq.so.5"
    }
}

fn lib_path_env_var() -> &'static str {
    if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else if cfg!(windows) {
        "PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Whether a bundle exists for the given os/arch pair.
pub fn platform_supported(os: &str, arch: &str) -> bool {
    matches!(
        (os, arch),
        ("linux", "x86_64")
            | ("linux", "aarch64")
            | ("macos", "x86_64")
            | ("macos", "aarch64")
            | ("windows", "x86_64")
    )
}

/// Bundle tag for the current platform, e.g. `linux_x86_64`.
fn platform_tag() -> Result<String, EngineError> {
    let os = env::consts::OS;
    let arch = env::consts::ARCH;
    if !platform_supported(os, arch) {
        return Err(EngineError::UnsupportedPlatform { os: os.to_string(), arch: arch.to_string() });
    }
    Ok(format!("{}_{}", os, arch))
}

/// Unpacks the embedded engine bundle into `dest`.
pub struct BundleExtractor;

impl BundleExtractor {
    /// Materialize the engine under `dest`. Returns the layout describing
    /// where everything landed.
    ///
    /// When `SQLDOCK_POSTGRES_BIN` is set, the system installation is used
    /// instead and no files are written.
    pub fn extract(dest: &Path) -> Result<EngineLayout, EngineError> {
        if let Ok(system_bin) = env::var(SYSTEM_POSTGRES_ENV) {
            if !system_bin.is_empty() {
                return Self::system_layout(&system_bin);
            }
        }

        let tag = platform_tag()?;
        std::fs::create_dir_all(dest)
            .map_err(|e| EngineError::Extraction(format!("cannot create {}: {}", dest.display(), e)))?;

        let postgres = Self::write_executable(dest, &format!("postgres_{}{}", tag, bin_ext()), "postgres")?;
        let initdb = Self::write_executable(dest, &format!("initdb_{}{}", tag, bin_ext()), "initdb")?;
        // pg_ctl is optional: stop() falls back to signalling the process.
        let pg_ctl =
            Self::write_executable(dest, &format!("pg_ctl_{}{}", tag, bin_ext()), "pg_ctl").ok();

        let lib_dir = dest.join("lib");
        std::fs::create_dir_all(&lib_dir)
            .map_err(|e| EngineError::Extraction(format!("cannot create lib dir: {}", e)))?;
        let lib_name = shared_lib_name();
        let lib_data = Self::asset(lib_name)?;
        std::fs::write(lib_dir.join(lib_name), &lib_data)
            .map_err(|e| EngineError::Extraction(format!("cannot write {}: {}", lib_name, e)))?;

        let archive = Self::asset("share.tar.gz")?;
        extract_tar_gz(&archive, dest)?;
        let share_dir = dest.join("share");

        info!("Engine bundle extracted to {}", dest.display());

        Ok(EngineLayout {
            root: Some(dest.to_path_buf()),
            postgres,
            initdb,
            pg_ctl,
            lib_dir: Some(lib_dir),
            share_dir: Some(share_dir),
        })
    }

    fn system_layout(postgres_bin: &str) -> Result<EngineLayout, EngineError> {
        info!("Using system PostgreSQL from {}: {}", SYSTEM_POSTGRES_ENV, postgres_bin);
        let postgres = PathBuf::from(postgres_bin);
        let bin_dir = postgres
            .parent()
            .ok_or_else(|| EngineError::Extraction("invalid system postgres path".to_string()))?
            .to_path_buf();

        let initdb = bin_dir.join(format!("initdb{}", bin_ext()));
        for (name, path) in [("postgres", &postgres), ("initdb", &initdb)] {
            if !path.exists() {
                return Err(EngineError::Extraction(format!(
                    "{} set but {} not found at {}",
                    SYSTEM_POSTGRES_ENV,
                    name,
                    path.display()
                )));
            }
        }

        let pg_ctl = {
            let p = bin_dir.join(format!("pg_ctl{}", bin_ext()));
            p.exists().then_some(p)
        };
        let share_dir = env::var("PGSHAREDIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from);

        Ok(EngineLayout { root: None, postgres, initdb, pg_ctl, lib_dir: None, share_dir })
    }

    fn asset(name: &str) -> Result<Vec<u8>, EngineError> {
        EngineAssets::get(name)
            .map(|f| f.data.into_owned())
            .ok_or_else(|| EngineError::Extraction(format!("embedded resource '{}' not found", name)))
    }

    fn write_executable(dest: &Path, asset_name: &str, out_name: &str) -> Result<PathBuf, EngineError> {
        let data = Self::asset(asset_name)?;
        let path = dest.join(format!("{}{}", out_name, bin_ext()));
        std::fs::write(&path, &data)
            .map_err(|e| EngineError::Extraction(format!("cannot write {}: {}", out_name, e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| EngineError::Extraction(format!("cannot chmod {}: {}", out_name, e)))?;
        }

        Ok(path)
    }
}

/// Decompress a gzipped tar archive into `target`. Existing files are
/// overwritten so re-extraction is idempotent.
pub(crate) fn extract_tar_gz(data: &[u8], target: &Path) -> Result<(), EngineError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| EngineError::Extraction(format!("gzip decode failed: {}", e)))?;

    let mut archive = tar::Archive::new(decompressed.as_slice());
    archive.set_overwrite(true);
    archive
        .unpack(target)
        .map_err(|e| EngineError::Extraction(format!("archive unpack failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn platform_matrix_matches_shipped_bundles() {
        assert!(platform_supported("linux", "x86_64"));
        assert!(platform_supported("linux", "aarch64"));
        assert!(platform_supported("macos", "aarch64"));
        assert!(platform_supported("windows", "x86_64"));
        assert!(!platform_supported("windows", "aarch64"));
        assert!(!platform_supported("freebsd", "x86_64"));
    }

    #[test]
    fn layout_env_includes_library_and_share_paths() {
        let layout = EngineLayout {
            root: Some(PathBuf::from("/tmp/x")),
            postgres: PathBuf::from("/tmp/x/postgres"),
            initdb: PathBuf::from("/tmp/x/initdb"),
            pg_ctl: None,
            lib_dir: Some(PathBuf::from("/tmp/x/lib")),
            share_dir: Some(PathBuf::from("/tmp/x/share")),
        };
        let env: std::collections::HashMap<_, _> = layout.command_env().into_iter().collect();
        assert_eq!(env.get("PGSHAREDIR").map(String::as_str), Some("/tmp/x/share"));
        assert_eq!(env.get("PKGLIBDIR").map(String::as_str), Some("/tmp/x/lib"));
        assert!(env.contains_key(super::lib_path_env_var()));
    }

    #[test]
    fn system_layout_env_is_minimal() {
        let layout = EngineLayout {
            root: None,
            postgres: PathBuf::from("/usr/bin/postgres"),
            initdb: PathBuf::from("/usr/bin/initdb"),
            pg_ctl: None,
            lib_dir: None,
            share_dir: None,
        };
        assert!(layout.command_env().is_empty());
        // No extraction root, nothing to clean up.
        layout.cleanup();
    }

    fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            for (name, content) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, content.as_bytes()).unwrap();
            }
            builder.finish().unwrap();
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn tar_extraction_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = build_archive(&[("share/postgres.bki", "bki-v1"), ("share/tz", "utc")]);

        extract_tar_gz(&archive, dir.path()).unwrap();
        let first = std::fs::read_to_string(dir.path().join("share/postgres.bki")).unwrap();
        assert_eq!(first, "bki-v1");

        // Second run over the same destination reuses/overwrites in place.
        extract_tar_gz(&archive, dir.path()).unwrap();
        let second = std::fs::read_to_string(dir.path().join("share/postgres.bki")).unwrap();
        assert_eq!(second, "bki-v1");
        assert!(dir.path().join("share/tz").exists());
    }

    #[test]
    fn partial_extraction_is_repaired_by_rerun() {
        let dir = tempfile::tempdir().unwrap();
        // Simulate a prior partial run: stale file where the archive will land.
        std::fs::create_dir_all(dir.path().join("share")).unwrap();
        std::fs::write(dir.path().join("share/postgres.bki"), "stale").unwrap();

        let archive = build_archive(&[("share/postgres.bki", "fresh")]);
        extract_tar_gz(&archive, dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join("share/postgres.bki")).unwrap();
        assert_eq!(content, "fresh");
    }

    #[test]
    fn corrupt_archive_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_tar_gz(b"not a gzip stream", dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
    }

    #[test]
    fn missing_embedded_asset_is_an_extraction_error() {
        let err = BundleExtractor::asset("postgres_never_shipped").unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
        assert!(err.to_string().contains("postgres_never_shipped"));
    }
}
