pub use crate::opts::{
    default_options, FftPlanEffort, KernelEvalMethod, ModeOrder, NufftError, NufftOpts,
    NufftResult, NufftWarning, SortStrategy, SpreadThreading,
};
pub use crate::plan::{NufftPlan, TransformKind};
pub use crate::{
    nufft_1d1, nufft_1d2, nufft_1d3, nufft_2d1, nufft_2d2, nufft_2d3, nufft_3d1, nufft_3d2,
    nufft_3d3,
};
pub use crate::NufftFloat;
