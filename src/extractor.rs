use super::SimpleResult;
use super::util::glob_match;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub extract_glob: Option<String>,
    pub delete_archive: bool,
    pub flatten: bool,
}

/// Stream a ZIP archive into a destination directory. Each matching entry is
/// written through a temp sibling and renamed into place. The archive is
/// removed only after a successful pass that matched at least one entry.
pub async fn extract_zip<P: AsRef<Path> + ?Sized, Q: AsRef<Path> + ?Sized>(
    archive_path: &P,
    dest_directory: &Q,
    options: &ExtractOptions,
) -> SimpleResult<Vec<PathBuf>> {
    let archive_path = archive_path.as_ref().to_path_buf();
    let dest_directory = dest_directory.as_ref().to_path_buf();
    let options = options.clone();

    match tokio::task::spawn_blocking(move || {
        extract_blocking(&archive_path, &dest_directory, &options)
    })
    .await
    {
        Ok(result) => result,
        Err(error) => bail!("Extraction task failed: {}", error),
    }
}

fn extract_blocking(
    archive_path: &Path,
    dest_directory: &Path,
    options: &ExtractOptions,
) -> SimpleResult<Vec<PathBuf>> {
    let file = try_with!(
        File::open(archive_path),
        "Failed to open {:?}",
        archive_path
    );
    let mut archive = try_with!(
        ZipArchive::new(BufReader::new(file)),
        "Failed to read {:?}",
        archive_path
    );

    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = try_with!(
            archive.by_index(index),
            "Failed to read entry {} in {:?}",
            index,
            archive_path
        );
        if entry.is_dir() {
            continue;
        }
        let Some(relative_path) = entry.enclosed_name() else {
            bail!(
                "Refusing to extract \"{}\", path escapes the destination",
                entry.name()
            );
        };
        let normalized = relative_path.to_string_lossy().replace('\\', "/");
        if let Some(extract_glob) = &options.extract_glob {
            if !glob_match(extract_glob, &normalized) {
                continue;
            }
        }

        let target = if options.flatten {
            let basename = relative_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| relative_path.clone());
            dest_directory.join(basename)
        } else {
            dest_directory.join(&relative_path)
        };
        if let Some(parent) = target.parent() {
            try_with!(
                std::fs::create_dir_all(parent),
                "Failed to create {:?}",
                parent
            );
        }

        let mut tmp_path = OsString::from(target.as_os_str());
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);
        {
            let mut output = try_with!(
                File::create(&tmp_path),
                "Failed to create {:?}",
                tmp_path
            );
            if let Err(error) = io::copy(&mut entry, &mut output) {
                std::fs::remove_file(&tmp_path).ok();
                bail!("Failed to extract \"{}\": {}", entry.name(), error);
            }
        }
        try_with!(
            std::fs::rename(&tmp_path, &target),
            "Failed to rename {:?} to {:?}",
            tmp_path,
            target
        );
        extracted.push(target);
    }

    if options.delete_archive && !extracted.is_empty() {
        try_with!(
            std::fs::remove_file(archive_path),
            "Failed to delete {:?}",
            archive_path
        );
    }

    Ok(extracted)
}

#[cfg(test)]
mod test_zip_slip;
