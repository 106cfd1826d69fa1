//! Contiguous per-layer KV cache with speculative staging.
//!
//! Rows `[0, committed)` hold accepted entries. Each forward pass appends the
//! whole candidate batch after them as staged rows; [`KvCache::compact`] then
//! gathers the accepted rows down to be contiguous from `committed` and drops
//! the rest. Rows past the committed length are stale until overwritten.

use half::f16;
use serde::{Deserialize, Serialize};

/// Element type stored in the cache.
pub trait KvElement: Copy + Default + Send + Sync + 'static {
    fn from_f32(value: f32) -> Self;
    fn to_f32(self) -> f32;
}

impl KvElement for f32 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

impl KvElement for f16 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

/// Configuration for a [`LayeredKvCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvCacheConfig {
    /// Number of attention layers.
    pub num_layers: usize,
    /// Floats per cached row (KV heads x head dim).
    pub kv_width: usize,
    /// Maximum rows, committed plus staged.
    pub capacity: usize,
}

impl Default for KvCacheConfig {
    fn default() -> Self {
        Self {
            num_layers: 32,
            kv_width: 1024,
            capacity: 4096,
        }
    }
}

/// Cache contract the base model and the decoder rely on.
///
/// Any implementation honoring it is substitutable.
pub trait KvCache: Send {
    type Elem: KvElement;

    /// Stage `keys`/`values` rows for `layer` and return every row of that
    /// layer so far, committed and staged.
    fn append(
        &mut self,
        layer: usize,
        keys: &[f32],
        values: &[f32],
    ) -> Result<(&[Self::Elem], &[Self::Elem]), KvCacheError>;

    /// Keep only the staged rows at `accepted` (offsets from the committed
    /// length, strictly increasing), contiguous from the committed length.
    fn compact(&mut self, accepted: &[usize]) -> Result<(), KvCacheError>;

    /// Commit every staged row as-is.
    fn promote_staged(&mut self);

    /// Drop every staged row.
    fn discard_staged(&mut self);

    fn committed_length(&self) -> usize;

    /// Committed plus staged rows.
    fn staged_length(&self) -> usize;

    fn capacity(&self) -> usize;

    fn reset(&mut self);
}

/// Dense KV cache: one contiguous buffer per layer for keys and for values.
#[derive(Debug, Clone)]
pub struct LayeredKvCache<T: KvElement = f32> {
    config: KvCacheConfig,
    keys: Vec<Vec<T>>,
    values: Vec<Vec<T>>,
    staged: Vec<usize>,
    committed: usize,
}

/// Half-precision variant.
pub type F16KvCache = LayeredKvCache<f16>;

impl<T: KvElement> LayeredKvCache<T> {
    /// Allocate a cache sized for `config.capacity` rows per layer.
    pub fn new(config: KvCacheConfig) -> Self {
        let layer_len = config.capacity * config.kv_width;
        Self {
            config,
            keys: (0..config.num_layers).map(|_| vec![T::default(); layer_len]).collect(),
            values: (0..config.num_layers).map(|_| vec![T::default(); layer_len]).collect(),
            staged: vec![0; config.num_layers],
            committed: 0,
        }
    }

    pub fn config(&self) -> &KvCacheConfig {
        &self.config
    }

    /// Committed key rows of `layer`.
    pub fn keys(&self, layer: usize) -> &[T] {
        &self.keys[layer][..self.committed * self.config.kv_width]
    }

    /// Committed value rows of `layer`.
    pub fn values(&self, layer: usize) -> &[T] {
        &self.values[layer][..self.committed * self.config.kv_width]
    }

    /// Key and value row at committed position `pos`.
    pub fn row(&self, layer: usize, pos: usize) -> Result<(&[T], &[T]), KvCacheError> {
        self.check_layer(layer)?;
        if pos >= self.committed {
            return Err(KvCacheError::PositionOutOfBounds {
                pos,
                len: self.committed,
            });
        }
        let w = self.config.kv_width;
        let span = pos * w..(pos + 1) * w;
        Ok((&self.keys[layer][span.clone()], &self.values[layer][span]))
    }

    /// Bytes held by the key and value buffers.
    pub fn memory_usage(&self) -> usize {
        2 * self.config.num_layers
            * self.config.capacity
            * self.config.kv_width
            * std::mem::size_of::<T>()
    }

    fn check_layer(&self, layer: usize) -> Result<(), KvCacheError> {
        if layer >= self.config.num_layers {
            return Err(KvCacheError::LayerOutOfRange {
                layer,
                num_layers: self.config.num_layers,
            });
        }
        Ok(())
    }

    fn staged_rows(&self) -> usize {
        self.staged.iter().copied().max().unwrap_or(0)
    }
}

impl<T: KvElement> KvCache for LayeredKvCache<T> {
    type Elem = T;

    fn append(
        &mut self,
        layer: usize,
        keys: &[f32],
        values: &[f32],
    ) -> Result<(&[T], &[T]), KvCacheError> {
        self.check_layer(layer)?;
        let w = self.config.kv_width;
        if keys.len() != values.len() || w == 0 || keys.len() % w != 0 {
            return Err(KvCacheError::ShapeMismatch {
                width: w,
                keys: keys.len(),
                values: values.len(),
            });
        }

        let rows = keys.len() / w;
        let start = self.committed + self.staged[layer];
        let end = start + rows;
        if end > self.config.capacity {
            return Err(KvCacheError::CapacityExceeded {
                requested: end,
                capacity: self.config.capacity,
            });
        }

        let key_dst = &mut self.keys[layer][start * w..end * w];
        for (dst, &src) in key_dst.iter_mut().zip(keys) {
            *dst = T::from_f32(src);
        }
        let value_dst = &mut self.values[layer][start * w..end * w];
        for (dst, &src) in value_dst.iter_mut().zip(values) {
            *dst = T::from_f32(src);
        }
        self.staged[layer] += rows;

        Ok((&self.keys[layer][..end * w], &self.values[layer][..end * w]))
    }

    fn compact(&mut self, accepted: &[usize]) -> Result<(), KvCacheError> {
        assert!(
            accepted.windows(2).all(|pair| pair[0] < pair[1]),
            "accepted cache positions must be strictly increasing: {:?}",
            accepted
        );
        let Some(&furthest) = accepted.last() else {
            self.discard_staged();
            return Ok(());
        };
        let staged = self.staged.iter().copied().min().unwrap_or(0);
        if furthest >= staged {
            return Err(KvCacheError::PositionOutOfBounds {
                pos: furthest,
                len: staged,
            });
        }

        // Positions are strictly increasing, so every destination row is at or
        // before its source and a forward copy never reads an overwritten row.
        let w = self.config.kv_width;
        let base = self.committed;
        for layer in 0..self.config.num_layers {
            for (offset, &pos) in accepted.iter().enumerate() {
                if offset == pos {
                    continue;
                }
                let src = (base + pos) * w;
                let dst = (base + offset) * w;
                self.keys[layer].copy_within(src..src + w, dst);
                self.values[layer].copy_within(src..src + w, dst);
            }
        }

        self.committed += accepted.len();
        self.staged.iter_mut().for_each(|s| *s = 0);
        Ok(())
    }

    fn promote_staged(&mut self) {
        debug_assert!(
            self.staged.windows(2).all(|pair| pair[0] == pair[1]),
            "layers staged different row counts: {:?}",
            self.staged
        );
        self.committed += self.staged_rows();
        self.staged.iter_mut().for_each(|s| *s = 0);
    }

    fn discard_staged(&mut self) {
        self.staged.iter_mut().for_each(|s| *s = 0);
    }

    fn committed_length(&self) -> usize {
        self.committed
    }

    fn staged_length(&self) -> usize {
        self.committed + self.staged_rows()
    }

    fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn reset(&mut self) {
        self.committed = 0;
        self.staged.iter_mut().for_each(|s| *s = 0);
    }
}

/// Errors for KV cache operations.
#[derive(Debug, thiserror::Error)]
pub enum KvCacheError {
    #[error("Cache capacity exceeded: {requested} rows requested, capacity {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error("Layer {layer} out of range for {num_layers} layers")]
    LayerOutOfRange { layer: usize, num_layers: usize },

    #[error("Row width {width} does not divide keys ({keys}) / values ({values})")]
    ShapeMismatch {
        width: usize,
        keys: usize,
        values: usize,
    },

    #[error("Position {pos} out of bounds for length {len}")]
    PositionOutOfBounds { pos: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> KvCacheConfig {
        KvCacheConfig {
            num_layers: 2,
            kv_width: 2,
            capacity: 16,
        }
    }

    /// Stage one row per value, key = value = the given number.
    fn stage(cache: &mut LayeredKvCache, rows: &[f32]) {
        let flat: Vec<f32> = rows.iter().flat_map(|&r| [r, r]).collect();
        for layer in 0..2 {
            cache.append(layer, &flat, &flat).unwrap();
        }
    }

    #[test]
    fn test_append_returns_all_rows_so_far() {
        let mut cache = LayeredKvCache::<f32>::new(small_config());
        stage(&mut cache, &[1.0, 2.0]);
        cache.promote_staged();
        let (keys, values) = cache.append(0, &[3.0, 3.0], &[4.0, 4.0]).unwrap();
        assert_eq!(keys, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        assert_eq!(values, &[1.0, 1.0, 2.0, 2.0, 4.0, 4.0]);
    }

    #[test]
    fn test_compact_gathers_interleaved_rows() {
        let mut cache = LayeredKvCache::<f32>::new(small_config());
        stage(&mut cache, &[9.0]);
        cache.promote_staged();
        stage(&mut cache, &[10.0, 11.0, 12.0, 13.0, 14.0]);
        cache.compact(&[0, 2, 4]).unwrap();

        assert_eq!(cache.committed_length(), 4);
        assert_eq!(cache.staged_length(), 4);
        for layer in 0..2 {
            assert_eq!(cache.keys(layer), &[9.0, 9.0, 10.0, 10.0, 12.0, 12.0, 14.0, 14.0]);
        }
    }

    #[test]
    fn test_compact_empty_keeps_committed() {
        let mut cache = LayeredKvCache::<f32>::new(small_config());
        stage(&mut cache, &[1.0, 2.0]);
        cache.promote_staged();
        cache.compact(&[]).unwrap();
        assert_eq!(cache.committed_length(), 2);
        assert_eq!(cache.keys(1), &[1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut cache = LayeredKvCache::<f32>::new(KvCacheConfig {
            capacity: 2,
            ..small_config()
        });
        let rows = vec![0.0; 6];
        let err = cache.append(0, &rows, &rows).unwrap_err();
        assert!(matches!(err, KvCacheError::CapacityExceeded { requested: 3, capacity: 2 }));
    }

    #[test]
    fn test_f16_storage() {
        let mut cache = F16KvCache::new(small_config());
        let (keys, _) = cache.append(0, &[0.5, 1.5], &[2.0, 3.0]).unwrap();
        assert_eq!(keys[1].to_f32(), 1.5);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_compact_rejects_unordered_positions() {
        let mut cache = LayeredKvCache::<f32>::new(small_config());
        stage(&mut cache, &[1.0, 2.0, 3.0]);
        let _ = cache.compact(&[2, 1]);
    }
}
