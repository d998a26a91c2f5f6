//! Template files bundled with a build unit.

use std::io;
use std::path::PathBuf;

use walkdir::WalkDir;

/// Resolves `rel` against the unit directory recorded at compile time in
/// `XRC_TEMPLATE_BASE_PATH`, or leaves it relative to the working directory.
#[macro_export]
macro_rules! template_path {
    ($rel:expr) => {
        match ::std::option_env!("XRC_TEMPLATE_BASE_PATH") {
            ::std::option::Option::Some(base) => ::std::format!("{}/{}", base.trim_end_matches('/'), $rel),
            ::std::option::Option::None => ::std::string::String::from($rel),
        }
    };
}

/// Reads a template file, or every file below a directory when `path` ends
/// in `/` (a trailing `*` is ignored). Contents are joined with newlines and
/// trimmed.
pub fn load_template(path: &str) -> io::Result<String> {
    let path = path.strip_suffix('*').unwrap_or(path);
    let files: Vec<PathBuf> = if path.ends_with('/') {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files
    } else {
        vec![PathBuf::from(path)]
    };

    let mut contents = Vec::with_capacity(files.len());
    for file in &files {
        contents.push(std::fs::read_to_string(file)?);
    }
    Ok(contents.join("\n").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_templates_are_concatenated_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "second\n").unwrap();
        std::fs::write(dir.path().join("a.yaml"), "\n  first").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.yaml"), "third").unwrap();

        let pattern = format!("{}/*", dir.path().display());
        assert_eq!(load_template(&pattern).unwrap(), "first\nsecond\n\nthird");
    }

    #[test]
    fn single_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("t.tmpl");
        std::fs::write(&file, "  {{ .x }}\n\n").unwrap();
        assert_eq!(load_template(&file.display().to_string()).unwrap(), "{{ .x }}");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_template("/definitely/not/here.tmpl").is_err());
        assert!(load_template("/definitely/not/here/").is_err());
    }

    #[test]
    fn template_path_keeps_suffixes() {
        let p = crate::template_path!("templates/*");
        assert!(p.ends_with("templates/*"));
    }
}
