
//! Data-parallel helpers for channel decompression, pixel decoding and compositing.
//! Each unit of work only reads its own input and writes its own output element.
//! Without the `rayon` feature, or if no thread pool can be created,
//! everything runs sequentially with identical results.

use crate::error::{Result, UnitResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;


/// Run `map` on every item and collect the results in order.
/// Uses a dedicated, named thread pool, as this is called for large batches
/// of independent jobs such as decompressing all channels of a file.
pub fn map_items<T, R, F>(items: Vec<T>, parallel: bool, map: F) -> Vec<R>
    where T: Send, R: Send, F: Fn(T) -> R + Send + Sync
{
    #[cfg(feature = "rayon")] {
        if parallel && items.len() > 1 {
            let pool = rayon_core::ThreadPoolBuilder::new()
                .thread_name(|index| format!("PSD Channel Thread #{}", index))
                .build();

            // thread pools cannot be created on some targets, such as wasm
            if let Ok(pool) = pool {
                return pool.install(|| items.into_par_iter().map(&map).collect());
            }
        }
    }

    let _ = parallel;
    items.into_iter().map(map).collect()
}

/// Run the fallible `job` on every item, returning the first error.
pub fn try_for_each<T, F>(items: Vec<T>, parallel: bool, job: F) -> UnitResult
    where T: Send, F: Fn(T) -> UnitResult + Send + Sync
{
    map_items(items, parallel, job).into_iter().collect::<Result<()>>()
}

/// Set every element of `output` to `compute(index)`.
/// Runs on the global rayon pool, as this is called per pixel.
pub fn fill_indexed<T, F>(output: &mut [T], parallel: bool, compute: F)
    where T: Send, F: Fn(usize) -> T + Send + Sync
{
    #[cfg(feature = "rayon")] {
        if parallel {
            output.par_iter_mut().enumerate()
                .for_each(|(index, element)| *element = compute(index));

            return;
        }
    }

    let _ = parallel;
    for (index, element) in output.iter_mut().enumerate() {
        *element = compute(index);
    }
}
