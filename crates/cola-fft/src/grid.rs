//! Grid buffers with aliased real and Fourier views.

use cola_math::Complex64;
use num_complex::Complex;

use crate::slab::Slab;

/// Which interpretation of a [`FftGrid`] buffer is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// Padded real mesh, index `(ix·nc + iy)·nzpad + iz`.
    Real,
    /// Half-complex Fourier mesh, index `(ix·nc + iy)·nckz + iz`.
    Fourier,
}

/// A slab of an `nc³` field stored in one allocation.
///
/// The real view is the complex buffer reinterpreted as twice as many
/// `f64`s, so a real row of `nc` values is padded to `2 (nc/2 + 1)`.
/// Reading the view that does not match [`FftGrid::space`] is a logic
/// error and panics.
#[derive(Debug)]
pub struct FftGrid {
    name: String,
    slab: Slab,
    buf: Vec<Complex64>,
    space: Space,
}

impl FftGrid {
    /// Allocate a zeroed grid, reusing a buffer from `arena` when it has one.
    pub fn allocate(name: impl Into<String>, slab: Slab, arena: Option<&mut GridArena>) -> Self {
        let len = slab.complex_len();
        let buf = match arena {
            Some(arena) => arena.take(len),
            None => vec![Complex::new(0.0, 0.0); len],
        };
        Self {
            name: name.into(),
            slab,
            buf,
            space: Space::Real,
        }
    }

    /// Release the buffer, back into `arena` if given.
    pub fn free(self, arena: Option<&mut GridArena>) {
        if let Some(arena) = arena {
            arena.give_back(self.buf);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slab(&self) -> &Slab {
        &self.slab
    }

    /// Current interpretation of the buffer.
    pub fn space(&self) -> Space {
        self.space
    }

    /// Relabel the buffer without touching its contents.
    ///
    /// Only the transform should need this.
    pub fn set_space(&mut self, space: Space) {
        self.space = space;
    }

    /// Zero the buffer and mark it as a real mesh.
    pub fn clear_real(&mut self) {
        self.buf.fill(Complex::new(0.0, 0.0));
        self.space = Space::Real;
    }

    /// Zero the buffer and mark it as a Fourier mesh.
    pub fn clear_fourier(&mut self) {
        self.buf.fill(Complex::new(0.0, 0.0));
        self.space = Space::Fourier;
    }

    /// Padded real view.
    pub fn real(&self) -> &[f64] {
        self.expect_space(Space::Real);
        bytemuck::cast_slice(&self.buf)
    }

    /// Mutable padded real view.
    pub fn real_mut(&mut self) -> &mut [f64] {
        self.expect_space(Space::Real);
        bytemuck::cast_slice_mut(&mut self.buf)
    }

    /// Fourier view.
    pub fn fourier(&self) -> &[Complex64] {
        self.expect_space(Space::Fourier);
        &self.buf
    }

    /// Mutable Fourier view.
    pub fn fourier_mut(&mut self) -> &mut [Complex64] {
        self.expect_space(Space::Fourier);
        &mut self.buf
    }

    /// Real value at local plane `ix_local`.
    #[inline]
    pub fn real_at(&self, ix_local: usize, iy: usize, iz: usize) -> f64 {
        self.real()[self.slab.real_index(ix_local, iy, iz)]
    }

    /// Fourier mode at local plane `ix_local`.
    #[inline]
    pub fn mode_at(&self, ix_local: usize, iy: usize, iz: usize) -> Complex64 {
        self.fourier()[self.slab.complex_index(ix_local, iy, iz)]
    }

    /// Copy the unpadded real values, x-major, into a dense vector.
    pub fn real_values(&self) -> Vec<f64> {
        let nc = self.slab.nc;
        let real = self.real();
        let mut out = Vec::with_capacity(self.slab.local_nx * nc * nc);
        for row in real.chunks(self.slab.nzpad()) {
            out.extend_from_slice(&row[..nc]);
        }
        out
    }

    /// Raw buffer regardless of interpretation.
    pub(crate) fn raw_mut(&mut self) -> &mut [Complex64] {
        &mut self.buf
    }

    fn expect_space(&self, space: Space) {
        assert_eq!(
            self.space, space,
            "grid '{}' read as {:?} while holding {:?} data",
            self.name, space, self.space
        );
    }
}

/// A pool of grid buffers reused across allocations.
///
/// Large meshes are allocated once and recycled rather than returned to
/// the system allocator between phases.
#[derive(Debug, Default)]
pub struct GridArena {
    name: String,
    free: Vec<Vec<Complex64>>,
    allocated: usize,
}

impl GridArena {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            free: Vec::new(),
            allocated: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffers ever allocated by this arena.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Buffers currently waiting for reuse.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// A zeroed buffer of `len` modes, recycled when one is large enough.
    pub fn take(&mut self, len: usize) -> Vec<Complex64> {
        match self.free.iter().position(|b| b.capacity() >= len) {
            Some(i) => {
                let mut buf = self.free.swap_remove(i);
                buf.clear();
                buf.resize(len, Complex::new(0.0, 0.0));
                buf
            }
            None => {
                self.allocated += 1;
                tracing::trace!(arena = %self.name, len, "allocating grid buffer");
                vec![Complex::new(0.0, 0.0); len]
            }
        }
    }

    /// Return a buffer for later reuse.
    pub fn give_back(&mut self, buf: Vec<Complex64>) {
        self.free.push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_alias_one_buffer() {
        let slab = Slab::full(4);
        let mut grid = FftGrid::allocate("test", slab, None);
        assert_eq!(grid.space(), Space::Real);
        assert_eq!(grid.real().len(), 2 * slab.complex_len());

        grid.real_mut()[0] = 1.5;
        grid.real_mut()[1] = -2.0;
        grid.set_space(Space::Fourier);
        assert_eq!(grid.fourier()[0], Complex::new(1.5, -2.0));
    }

    #[test]
    #[should_panic(expected = "read as Fourier")]
    fn test_stale_view_panics() {
        let mut grid = FftGrid::allocate("stale", Slab::full(4), None);
        grid.clear_real();
        let _ = grid.fourier();
    }

    #[test]
    fn test_real_values_strip_padding() {
        let slab = Slab::full(2);
        let mut grid = FftGrid::allocate("pad", slab, None);
        // nzpad = 4 for nc = 2
        for (i, v) in grid.real_mut().iter_mut().enumerate() {
            *v = i as f64;
        }
        assert_eq!(grid.real_values(), vec![0.0, 1.0, 4.0, 5.0, 8.0, 9.0, 12.0, 13.0]);
    }

    #[test]
    fn test_arena_recycles() {
        let mut arena = GridArena::new("lpt");
        let slab = Slab::full(4);

        let mut a = FftGrid::allocate("a", slab, Some(&mut arena));
        a.real_mut()[3] = 7.0;
        a.free(Some(&mut arena));
        assert_eq!(arena.available(), 1);

        let b = FftGrid::allocate("b", slab, Some(&mut arena));
        assert_eq!(arena.allocated(), 1);
        assert_eq!(arena.available(), 0);
        assert!(b.real().iter().all(|&v| v == 0.0));
    }
}
