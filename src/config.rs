//! Resolution of the runtime/peephole data directory (spec.md §6,
//! "Environment"), grounded in `examples/original_source/flags.c`'s
//! `set_paths()`.

use std::path::{Path, PathBuf};

/// The data directory's contents (spec.md §6, "Data-directory contents"):
/// the i386 runtime prelude and the peephole rules file.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolves the data directory: the `-d/--data-dir` flag wins if given,
    /// otherwise the `JL_DATA_DIR` environment variable, otherwise `./`.
    pub fn resolve(flag: Option<&str>) -> DataDir {
        let root = match flag {
            Some(p) => PathBuf::from(p),
            None => match std::env::var_os("JL_DATA_DIR") {
                Some(v) => PathBuf::from(v),
                None => PathBuf::from("./"),
            },
        };
        DataDir { root }
    }

    pub fn runtime_asm_path(&self) -> PathBuf {
        self.root.join("i386_linux.asm")
    }

    pub fn peephole_rules_path(&self) -> PathBuf {
        self.root.join("i386.opt")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
