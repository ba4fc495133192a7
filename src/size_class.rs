//! Size-class table: the size ↔ class-index bijection.
//!
//! Classes `0..eff_size` grow by exactly one `granularity` step each (the
//! linear region). Beyond that, growth happens in doubling blocks of
//! `eff_size` classes each — block `b` grows every class within it by
//! `granularity << b`. This is the classic "stepped pool" scheme used by
//! Tarantool's `small` allocator: integer-exact, branch-light, and close
//! enough to true geometric growth (ratio `2^(1/eff_size)`) to land within
//! `√requested_factor` of the caller's requested factor.

/// Mapping from byte size to class index and back.
#[derive(Debug, Clone)]
pub struct SizeClass {
    granularity: u32,
    requested_factor: f32,
    actual_factor: f32,
    min_alloc: u32,
    /// Number of classes in the linear region, and the block width of the
    /// geometric region beyond it. Always a power of two.
    eff_size: u32,
}

impl SizeClass {
    /// Build a size-class table.
    ///
    /// `granularity` must be a power of two; `requested_factor` must be in
    /// `(1.0, 2.0]`. Both are asserted by the caller (`SmallAllocConfig::validate`)
    /// before this runs, so this constructor only asserts again defensively.
    pub fn new(granularity: u32, requested_factor: f32, min_alloc: u32) -> Self {
        assert!(granularity.is_power_of_two());
        assert!(requested_factor > 1.0 && requested_factor <= 2.0);

        let min_alloc = crate::util::layout::align_up(min_alloc as usize, granularity as usize) as u32;
        let min_alloc = min_alloc.max(granularity);

        let eff_size = Self::compute_eff_size(requested_factor);
        let actual_factor = 2f64.powf(1.0 / eff_size as f64) as f32;

        Self {
            granularity,
            requested_factor,
            actual_factor,
            min_alloc,
            eff_size,
        }
    }

    /// Choose the linear-region width / geometric block width: the power
    /// of two closest to `ln(2) / ln(factor)`, the number of classes over
    /// which compounding `factor` growth amounts to a 2x increase.
    fn compute_eff_size(factor: f32) -> u32 {
        let ideal = (std::f64::consts::LN_2 / (factor as f64).ln()).max(1.0);
        let k = ideal.log2().round().max(0.0) as u32;
        1u32 << k
    }

    /// Granularity of the linear region (and alignment of every class size).
    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    /// The factor the caller asked for.
    pub fn requested_factor(&self) -> f32 {
        self.requested_factor
    }

    /// The factor actually achieved by the integer table, within
    /// `[requested/√requested, requested·√requested]`.
    pub fn actual_factor(&self) -> f32 {
        self.actual_factor
    }

    /// `size_by_class(0)`.
    pub fn min_alloc(&self) -> u32 {
        self.min_alloc
    }

    /// Width of the linear region / geometric doubling blocks.
    pub fn eff_size(&self) -> u32 {
        self.eff_size
    }

    /// `base(b)`: the class size at the boundary just before geometric
    /// block `b` starts, i.e. `size_by_class(eff_size + b*eff_size - 1)`
    /// for `b >= 1`, and `size_by_class(eff_size - 1)` for `b == 0`.
    fn block_base(&self, b: u32) -> u64 {
        let g = self.granularity as u64;
        let l = self.eff_size as u64;
        let m = self.min_alloc as u64;
        m + (l - 1) * g + g * l * ((1u64 << b) - 1)
    }

    /// Byte size of class `i`.
    pub fn size_by_class(&self, i: u32) -> u32 {
        let g = self.granularity as u64;
        if i < self.eff_size {
            return self.min_alloc + i * self.granularity;
        }
        let i2 = (i - self.eff_size) as u64;
        let l = self.eff_size as u64;
        let b = i2 / l;
        let j = i2 % l;
        let growth = g << b;
        let base = self.block_base(b as u32);
        (base + (j + 1) * growth) as u32
    }

    /// Smallest class index `i` such that `size_by_class(i) >= size`.
    pub fn class_by_size(&self, size: u32) -> u32 {
        let s = size.max(self.min_alloc) as u64;
        let base0 = self.block_base(0);
        if s <= base0 {
            let i = if s <= self.min_alloc as u64 {
                0
            } else {
                let delta = s - self.min_alloc as u64;
                ceil_div(delta, self.granularity as u64)
            };
            return (i as u32).min(self.eff_size - 1);
        }

        // Blocks double in width, so a short ascending search suffices:
        // the number of iterations is bounded by log2(size / min_alloc).
        let mut b: u32 = 0;
        while self.block_base(b + 1) < s {
            b += 1;
        }
        let growth = (self.granularity as u64) << b;
        let rem = s - self.block_base(b);
        let j = ceil_div(rem, growth) - 1;
        self.eff_size + b * self.eff_size + j as u32
    }
}

/// Integer ceiling division. `b` must be nonzero.
fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}
