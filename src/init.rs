//! Matrix initialization strategies.

use crate::error::StrategyError;
use crate::multiply::{check_dimension, thread_pool};
use crate::registry::{StrategyHandle, StrategyRegistry};
use crate::timer::Timer;
use crate::Real;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Source used by `file` when no path is given.
pub const DEFAULT_INIT_FILE: &str = "/dev/urandom";

/// Fills an `n x n` row-major matrix, timed as one cycle.
pub trait InitMethod: Send + Sync {
    fn init(
        &self,
        timer: &mut Timer,
        nthreads: usize,
        n: usize,
        m: &mut [Real],
    ) -> Result<(), StrategyError>;
}

pub type InitRegistry = StrategyRegistry<dyn InitMethod>;
pub type InitHandle = StrategyHandle<dyn InitMethod>;

type InitFactory = fn(&str) -> Result<Box<dyn InitMethod>, StrategyError>;

/// Built-ins in enumeration order, with their help tokens.
const BUILTINS: [(&str, Option<&str>, InitFactory); 6] = [
    ("noop", None, builtin::<Noop>),
    ("zero", None, builtin::<Zero>),
    ("simple", None, builtin::<Simple>),
    ("simple-parallel", None, builtin::<SimpleParallel>),
    ("random", Some("random{=###}"), RandomInit::from_args),
    ("file", Some("file={opt{,..}:}<name>"), FileInit::from_args),
];

/// Init registry with the built-in strategies installed on first use.
pub fn init_registry() -> InitRegistry {
    StrategyRegistry::with_installer("init", install_builtins)
}

fn install_builtins(registry: &InitRegistry) {
    for (name, help, factory) in BUILTINS.iter().rev() {
        if let Err(err) = registry.register_builtin(name, *help, *factory) {
            log::warn!("skipping built-in init strategy '{name}': {err}");
        }
    }
}

fn builtin<M>(_args: &str) -> Result<Box<dyn InitMethod>, StrategyError>
where
    M: InitMethod + Default + 'static,
{
    Ok(Box::new(M::default()))
}

impl StrategyHandle<dyn InitMethod> {
    /// Run the bound strategy after checking the matrix size.
    pub fn init(
        &self,
        timer: &mut Timer,
        nthreads: usize,
        n: usize,
        m: &mut [Real],
    ) -> Result<(), StrategyError> {
        check_dimension(n, m.len())?;
        self.instance().init(timer, nthreads, n, m)
    }
}

/// Leaves the matrix untouched; measures only the timer overhead.
#[derive(Debug, Default)]
pub struct Noop;

impl InitMethod for Noop {
    fn init(&self, timer: &mut Timer, _: usize, _: usize, _: &mut [Real]) -> Result<(), StrategyError> {
        timer.start();
        timer.stop();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Zero;

impl InitMethod for Zero {
    fn init(&self, timer: &mut Timer, _: usize, _: usize, m: &mut [Real]) -> Result<(), StrategyError> {
        timer.measure(|| m.fill(0.0));
        Ok(())
    }
}

fn simple_row(i: usize, row: &mut [Real]) {
    for (j, x) in row.iter_mut().enumerate() {
        *x = (i * i + 2 * i * j + j * j) as Real;
    }
}

/// `M[i][j] = i² + 2ij + j²`.
#[derive(Debug, Default)]
pub struct Simple;

impl InitMethod for Simple {
    fn init(&self, timer: &mut Timer, _: usize, n: usize, m: &mut [Real]) -> Result<(), StrategyError> {
        timer.measure(|| {
            for (i, row) in m.chunks_exact_mut(n).enumerate() {
                simple_row(i, row);
            }
        });
        Ok(())
    }
}

/// [`Simple`] with rows spread across a rayon pool.
#[derive(Debug, Default)]
pub struct SimpleParallel;

impl InitMethod for SimpleParallel {
    fn init(&self, timer: &mut Timer, nthreads: usize, n: usize, m: &mut [Real]) -> Result<(), StrategyError> {
        let pool = thread_pool(nthreads)?;
        timer.measure(|| {
            pool.install(|| {
                m.par_chunks_mut(n)
                    .enumerate()
                    .for_each(|(i, row)| simple_row(i, row));
            })
        });
        Ok(())
    }
}

/// Uniform values in `[0, 1]` from a seeded generator.
///
/// The generator state carries over between calls, so successive matrices
/// differ while the whole sequence is reproducible from the seed.
#[derive(Debug)]
pub struct RandomInit {
    rng: Mutex<StdRng>,
}

impl RandomInit {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Seed from `args`; empty means 0.
    pub fn from_args(args: &str) -> Result<Box<dyn InitMethod>, StrategyError> {
        let args = args.trim();
        let seed = if args.is_empty() {
            0
        } else {
            args.parse::<u64>()
                .map_err(|e| StrategyError::InvalidArgument {
                    strategy: "random".into(),
                    message: format!("seed '{args}': {e}"),
                })?
        };
        log::debug!("random init seeded with {seed}");
        Ok(Box::new(Self::with_seed(seed)))
    }
}

impl InitMethod for RandomInit {
    fn init(&self, timer: &mut Timer, _: usize, _: usize, m: &mut [Real]) -> Result<(), StrategyError> {
        // Poisoning leaves the generator state valid.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        timer.measure(|| {
            for x in m.iter_mut() {
                *x = rng.gen_range(0.0..=1.0);
            }
        });
        Ok(())
    }
}

/// Open options accepted before the `:` in `file=` arguments.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileOptions {
    pub sync: bool,
    pub noatime: bool,
    pub direct: bool,
}

impl FileOptions {
    fn parse(list: &str) -> Result<Self, StrategyError> {
        let mut opts = Self::default();
        for opt in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match opt.to_ascii_lowercase().as_str() {
                "sync" => opts.sync = true,
                "noatime" => opts.noatime = true,
                "direct" => opts.direct = true,
                other => {
                    return Err(StrategyError::InvalidArgument {
                        strategy: "file".into(),
                        message: format!("unknown option '{other}' (expected sync, noatime or direct)"),
                    })
                }
            }
        }
        Ok(opts)
    }

    #[cfg(target_os = "linux")]
    fn open_flags(self) -> Result<i32, StrategyError> {
        let mut flags = 0;
        if self.sync {
            flags |= libc::O_SYNC;
        }
        if self.noatime {
            flags |= libc::O_NOATIME;
        }
        if self.direct {
            flags |= libc::O_DIRECT;
        }
        Ok(flags)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn open_flags(self) -> Result<i32, StrategyError> {
        if self.noatime || self.direct {
            return Err(StrategyError::InvalidArgument {
                strategy: "file".into(),
                message: "noatime and direct are only supported on Linux".into(),
            });
        }
        Ok(if self.sync { libc::O_SYNC } else { 0 })
    }

    #[cfg(not(unix))]
    fn open_flags(self) -> Result<i32, StrategyError> {
        if self != Self::default() {
            return Err(StrategyError::InvalidArgument {
                strategy: "file".into(),
                message: "open options are not supported on this platform".into(),
            });
        }
        Ok(0)
    }
}

/// Fills matrices with raw native-endian values read from a file.
///
/// Elements are read one at a time. When the file runs out it is rewound
/// once for that element; a second short read is an error.
#[derive(Debug)]
pub struct FileInit {
    path: PathBuf,
    options: FileOptions,
    file: File,
}

impl FileInit {
    /// Open `path` with the given options.
    pub fn open(path: &Path, options: FileOptions) -> Result<Self, StrategyError> {
        let flags = options.open_flags()?;
        let mut open = OpenOptions::new();
        open.read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open.custom_flags(flags);
        }
        #[cfg(not(unix))]
        let _ = flags;

        let file = open.open(path).map_err(|source| StrategyError::Io {
            context: format!("could not open matrix init file {} ({options:?})", path.display()),
            source,
        })?;
        log::debug!("opened matrix init file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            options,
            file,
        })
    }

    /// Parse `{opt{,opt..}:}<path>`; an empty path selects [`DEFAULT_INIT_FILE`].
    pub fn from_args(args: &str) -> Result<Box<dyn InitMethod>, StrategyError> {
        let (options, path) = match args.split_once(':') {
            Some((list, path)) => (FileOptions::parse(list)?, path),
            None => (FileOptions::default(), args),
        };
        let path = if path.is_empty() { DEFAULT_INIT_FILE } else { path };
        Ok(Box::new(Self::open(Path::new(path), options)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> FileOptions {
        self.options
    }

    fn read_element(&self) -> Result<Real, StrategyError> {
        let mut buf = [0u8; std::mem::size_of::<Real>()];
        if fill(&self.file, &mut buf).map_err(|e| self.io_error("read from", e))? < buf.len() {
            (&self.file)
                .seek(SeekFrom::Start(0))
                .map_err(|e| self.io_error("rewind", e))?;
            if fill(&self.file, &mut buf).map_err(|e| self.io_error("read from", e))? < buf.len() {
                return Err(self.io_error(
                    "read from",
                    io::Error::new(io::ErrorKind::UnexpectedEof, "file is shorter than one element"),
                ));
            }
        }
        Ok(Real::from_ne_bytes(buf))
    }

    fn io_error(&self, action: &str, source: io::Error) -> StrategyError {
        StrategyError::Io {
            context: format!("unable to {action} matrix init file {}", self.path.display()),
            source,
        }
    }
}

/// Read until `buf` is full or the file ends; returns the bytes read.
fn fill(mut file: &File, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(k) => read += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

impl InitMethod for FileInit {
    fn init(&self, timer: &mut Timer, _: usize, _: usize, m: &mut [Real]) -> Result<(), StrategyError> {
        timer.start();
        for x in m.iter_mut() {
            match self.read_element() {
                Ok(value) => *x = value,
                Err(e) => {
                    timer.cancel();
                    return Err(e);
                }
            }
        }
        timer.stop();
        Ok(())
    }
}
