use thiserror::Error;

////////////
// Errors //
////////////

/// Convenience alias used by every fallible call in the crate
pub type NufftResult<T> = Result<T, NufftError>;

/// Fatal errors raised while planning, binding points or executing
///
/// All of these abort the call that raised them; no partial state is kept
/// alive on the plan beyond what was already valid before the call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NufftError {
    #[error("dimension must be 1, 2 or 3, got {0}")]
    InvalidDim(usize),
    #[error("number of transforms must be at least 1, got {0}")]
    InvalidTransformCount(usize),
    #[error("upsampling factor must be 2.0 or 1.25, got {0}")]
    InvalidUpsampFactor(f64),
    #[error("fine grid of {requested} points exceeds the cap of {cap}")]
    GridTooLarge { requested: u64, cap: u64 },
    #[error("non-uniform point {index} at {coord} lies outside [-3pi, 3pi]")]
    PointOutOfRange { index: usize, coord: f64 },
    #[error("set_points must be called before execute")]
    PointsNotSet,
    #[error("type-3 plans bind target frequencies; call set_points_type3")]
    TargetsRequired,
    #[error("target frequencies are only accepted by type-3 plans")]
    TargetsUnexpected,
    #[error("array of length {got} where {expected} elements were expected")]
    InvalidArrayLength { expected: usize, got: usize },
    #[error("coordinate arrays do not match a {dim}-dimensional plan")]
    CoordsMismatch { dim: usize },
}

/// Non-fatal conditions; execution proceeds after queueing one of these
///
/// Warnings raised during planning are collected on the plan and can be
/// inspected via [`crate::plan::NufftPlan::warnings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NufftWarning {
    /// The requested tolerance was outside the supported range and has
    /// been clamped to the nearest attainable value.
    ToleranceClamped { requested: f64, clamped: f64 },
}

/////////////
// Options //
/////////////

/// Ordering of the Fourier-mode axis in user-facing arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeOrder {
    /// Modes stored increasing from `-m/2` to `ceil(m/2) - 1`
    #[default]
    Cmcl,
    /// Modes stored `0..m-1` with positive-then-negative wrapping
    Fft,
}

/// Whether non-uniform points are sorted into grid tiles before spreading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortStrategy {
    Never,
    Always,
    /// Sort when the point count does not dwarf the fine grid and more
    /// than one thread is available
    #[default]
    Auto,
}

/// How the spreading kernel is evaluated on the hot path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelEvalMethod {
    /// Direct transcendental evaluation (exp + sqrt per stencil value)
    Direct,
    /// Piecewise polynomials fitted at plan time, evaluated in nested
    /// (Horner) form
    #[default]
    Horner,
}

/// Planning-effort hint forwarded to the FFT adapter
///
/// The rustfft backend plans algorithmically and caches, so both values
/// currently behave alike; the field is kept so callers written against
/// measuring FFT backends keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftPlanEffort {
    #[default]
    Estimate,
    Measure,
}

/// How threads are split between transforms of a batch and the inner
/// spread/interpolation kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadThreading {
    /// Parallel-outer when the batch has at least as many sets as
    /// threads, sequential-outer otherwise
    #[default]
    Auto,
    /// One set at a time; each spread/interp call uses all threads
    SeqOuter,
    /// One thread per set; inner kernels run serially
    ParOuter,
    /// Parallel over sets and inside each set; rayon's work stealing
    /// balances the nesting
    Nested,
}

/// User-controllable options copied into every plan
///
/// ### Fields
///
/// * `debug` - 0 silent, 1 planner/executor timings
/// * `spread_debug` - 0 silent, 1 some, 2 verbose spreader output
/// * `spread_sort` - Point sorting strategy, see [`SortStrategy`]
/// * `kernel_eval` - Kernel evaluation method, see [`KernelEvalMethod`]
/// * `spread_kerpad` - Pad stencil buffers to a multiple of 4 values
/// * `chkbnds` - Verify points lie in the fold-safe range `[-3pi, 3pi]`
/// * `fft_effort` - Planning-effort hint for the FFT adapter
/// * `modeord` - Mode ordering of user arrays, see [`ModeOrder`]
/// * `upsampfac` - Oversampling ratio sigma; 2.0 or 1.25 only
/// * `spread_thread` - Batch threading scheme, see [`SpreadThreading`]
/// * `max_batch_size` - Transforms per FFT call; 0 picks the thread count
#[derive(Debug, Clone)]
pub struct NufftOpts {
    pub debug: u32,
    pub spread_debug: u32,
    pub spread_sort: SortStrategy,
    pub kernel_eval: KernelEvalMethod,
    pub spread_kerpad: bool,
    pub chkbnds: bool,
    pub fft_effort: FftPlanEffort,
    pub modeord: ModeOrder,
    pub upsampfac: f64,
    pub spread_thread: SpreadThreading,
    pub max_batch_size: usize,
}

impl Default for NufftOpts {
    fn default() -> Self {
        Self {
            debug: 0,
            spread_debug: 0,
            spread_sort: SortStrategy::Auto,
            kernel_eval: KernelEvalMethod::Horner,
            spread_kerpad: true,
            chkbnds: true,
            fft_effort: FftPlanEffort::Estimate,
            modeord: ModeOrder::Cmcl,
            upsampfac: 2.0,
            spread_thread: SpreadThreading::Auto,
            max_batch_size: 0,
        }
    }
}

/// Fill an option record with the defaults above
pub fn default_options() -> NufftOpts {
    NufftOpts::default()
}

///////////
// Tests //
///////////
