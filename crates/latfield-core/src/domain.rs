//! Cartesian decomposition descriptor.

use crate::error::{Error, Result};
use crate::procgroup::{CartesianTopology, ProcessGroup, SingleProcessGroup};
use std::cell::RefCell;

/// A single neighbor link: rank plus the matched send/recv tag pair.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    /// Offset in process-grid coordinates, each component in `{-1,0,1}`.
    pub offset: [i32; 3],
    /// Rank of the neighbor process.
    pub rank: usize,
    /// Tag this process uses when sending toward this neighbor.
    pub send_tag: i32,
    /// Tag this process uses when receiving from this neighbor.
    pub recv_tag: i32,
}

/// A Cartesian decomposition of a global regular grid across a process
/// group.
///
/// Setters are no-ops once [`Domain::commit`] has run; see the crate's
/// commit-then-freeze convention.
pub struct Domain {
    process_group: Box<dyn ProcessGroup>,
    n_dims: usize,
    n_ghst: usize,
    g_ntot: [usize; 3],
    g_strt: [usize; 3],
    l_nint: [usize; 3],
    l_ntot: [usize; 3],
    l_strt: [usize; 3],
    proc_sizes: [usize; 3],
    proc_index: [usize; 3],
    glb_lower: [f64; 3],
    glb_upper: [f64; 3],
    loc_lower: [f64; 3],
    loc_upper: [f64; 3],
    neighbors: Vec<Neighbor>,
    topology: Option<Box<dyn CartesianTopology>>,
    committed: bool,
    balanced: bool,
    // Reserved I/O-subsystem knobs; see `Error::Unimplemented`.
    collective: RefCell<bool>,
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("n_dims", &self.n_dims)
            .field("n_ghst", &self.n_ghst)
            .field("g_ntot", &self.g_ntot)
            .field("l_nint", &self.l_nint)
            .field("proc_sizes", &self.proc_sizes)
            .field("proc_index", &self.proc_index)
            .field("committed", &self.committed)
            .finish()
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

impl Domain {
    /// Construct an uncommitted Domain bound to the always-available
    /// single-process group. Use [`Domain::with_process_group`] to run
    /// against a real distributed transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_process_group(Box::new(SingleProcessGroup))
    }

    /// Construct an uncommitted Domain bound to a specific process group.
    #[must_use]
    pub fn with_process_group(process_group: Box<dyn ProcessGroup>) -> Self {
        Self {
            process_group,
            n_dims: 1,
            n_ghst: 0,
            g_ntot: [1, 1, 1],
            g_strt: [0, 0, 0],
            l_nint: [1, 1, 1],
            l_ntot: [1, 1, 1],
            l_strt: [0, 0, 0],
            proc_sizes: [0, 0, 0],
            proc_index: [0, 0, 0],
            glb_lower: [0.0, 0.0, 0.0],
            glb_upper: [1.0, 1.0, 1.0],
            loc_lower: [0.0, 0.0, 0.0],
            loc_upper: [1.0, 1.0, 1.0],
            neighbors: Vec::new(),
            topology: None,
            committed: false,
            balanced: true,
            collective: RefCell::new(false),
        }
    }

    fn guard_mutable(&self, what: &str) -> bool {
        if self.committed {
            tracing::debug!(op = what, "ignored: domain already committed");
            false
        } else {
            true
        }
    }

    /// Set the global extent along `dim`. No-op once committed.
    pub fn set_size(&mut self, dim: usize, size: usize) {
        if !self.guard_mutable("set_size") {
            return;
        }
        if dim >= 3 {
            tracing::debug!(dim, "ignored: dimension out of range");
            return;
        }
        self.g_ntot[dim] = size;
    }

    /// Set the dimensionality (1, 2, or 3). No-op once committed.
    pub fn set_ndim(&mut self, n: usize) {
        if !self.guard_mutable("set_ndim") {
            return;
        }
        if n == 0 || n > 3 {
            tracing::debug!(n, "ignored: n_dims out of range");
            return;
        }
        self.n_dims = n;
    }

    /// Set the guard (halo) width, uniform across axes. No-op once
    /// committed.
    pub fn set_guard(&mut self, g: usize) {
        if !self.guard_mutable("set_guard") {
            return;
        }
        self.n_ghst = g;
    }

    /// Pin the process-grid extent along `dim`; `0` leaves it free for
    /// [`ProcessGroup::factor_dims`] to fill at commit. No-op once
    /// committed.
    pub fn set_proc_sizes(&mut self, dim: usize, n: usize) {
        if !self.guard_mutable("set_proc_sizes") {
            return;
        }
        if dim >= 3 {
            tracing::debug!(dim, "ignored: dimension out of range");
            return;
        }
        self.proc_sizes[dim] = n;
    }

    /// Set the physical lower/upper bounds of the global domain along
    /// `dim`. No-op once committed.
    pub fn set_bounds(&mut self, dim: usize, lower: f64, upper: f64) {
        if !self.guard_mutable("set_bounds") {
            return;
        }
        if dim >= 3 {
            tracing::debug!(dim, "ignored: dimension out of range");
            return;
        }
        self.glb_lower[dim] = lower;
        self.glb_upper[dim] = upper;
    }

    /// Reserved for the out-of-scope parallel I/O subsystem.
    ///
    /// # Errors
    /// Always returns [`Error::Unimplemented`].
    pub fn set_collective(&self, _on: bool) -> Result<()> {
        Err(Error::Unimplemented)
    }

    /// Reserved for the out-of-scope parallel I/O subsystem.
    ///
    /// # Errors
    /// Always returns [`Error::Unimplemented`].
    pub fn set_chunk(&self, _sizes: [usize; 3]) -> Result<()> {
        Err(Error::Unimplemented)
    }

    /// Reserved for the out-of-scope parallel I/O subsystem.
    ///
    /// # Errors
    /// Always returns [`Error::Unimplemented`].
    pub fn set_align(&self, _alignment: usize) -> Result<()> {
        Err(Error::Unimplemented)
    }

    /// Reserved for the out-of-scope parallel I/O subsystem.
    ///
    /// # Errors
    /// Always returns [`Error::Unimplemented`].
    pub fn read_size(&self, _path: &std::path::Path) -> Result<[usize; 3]> {
        Err(Error::Unimplemented)
    }

    /// Run the decomposition algorithm: factor the process count into
    /// `proc_sizes`, build the periodic Cartesian topology, partition each
    /// axis via the first-R-carry rule, and compute the neighbor/tag
    /// table. Idempotent.
    ///
    /// # Errors
    /// Returns [`Error::DecompositionImpossible`] if `proc_sizes` cannot be
    /// completed to match the process-group size.
    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Ok(());
        }

        self.process_group
            .factor_dims(self.n_dims, &mut self.proc_sizes)?;
        let topology = self
            .process_group
            .cartesian(self.n_dims, self.proc_sizes)?;
        self.proc_index = topology.coords();

        for i in 0..self.n_dims {
            let p = self.proc_sizes[i];
            let total = self.g_ntot[i];
            let q = total / p;
            let r = total % p;
            let idx = self.proc_index[i];
            let local = if idx < r { q + 1 } else { q };
            // Prefix sum: ranks before this one along axis i contribute
            // q+1 for the first r of them, q for the rest.
            let before_r = idx.min(r);
            let strt = before_r * (q + 1) + idx.saturating_sub(r) * q;

            self.l_nint[i] = local;
            self.g_strt[i] = strt;
            self.l_ntot[i] = local + 2 * self.n_ghst;
            self.l_strt[i] = self.n_ghst;

            let dx = (self.glb_upper[i] - self.glb_lower[i]) / total as f64;
            self.loc_lower[i] = self.glb_lower[i] + dx * strt as f64;
            self.loc_upper[i] = self.glb_lower[i] + dx * (strt + local) as f64;

            self.balanced &= r == 0;
        }
        for i in self.n_dims..3 {
            self.l_nint[i] = 1;
            self.l_ntot[i] = 1;
            self.g_strt[i] = 0;
        }

        self.build_neighbors(topology.as_ref());
        self.topology = Some(topology);
        self.committed = true;
        Ok(())
    }

    fn build_neighbors(&mut self, topology: &dyn CartesianTopology) {
        self.neighbors.clear();
        let offsets = neighbor_offsets(self.n_dims);
        for offset in offsets {
            let rank = topology.neighbor_rank(offset);
            let send_tag = tag_of(self.n_dims, offset);
            let recv_tag = tag_of(
                self.n_dims,
                [-offset[0], -offset[1], -offset[2]],
            );
            self.neighbors.push(Neighbor {
                offset,
                rank,
                send_tag,
                recv_tag,
            });
        }
    }

    /// Enumerate every neighbor link. Empty before commit.
    #[must_use]
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// Whether `commit` has run.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Whether every rank along every axis holds the same interior extent.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.balanced
    }

    /// Dimensionality.
    #[must_use]
    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Guard width.
    #[must_use]
    pub fn guard(&self) -> usize {
        self.n_ghst
    }

    /// Global extent along `dim`.
    #[must_use]
    pub fn global_size(&self, dim: usize) -> usize {
        self.g_ntot.get(dim).copied().unwrap_or(1)
    }

    /// This process's local interior extent along `dim`.
    #[must_use]
    pub fn local_interior_size(&self, dim: usize) -> usize {
        self.l_nint.get(dim).copied().unwrap_or(1)
    }

    /// This process's local extent, interior plus guard, along `dim`.
    #[must_use]
    pub fn local_total_size(&self, dim: usize) -> usize {
        self.l_ntot.get(dim).copied().unwrap_or(1)
    }

    /// This process's global start index along `dim`.
    #[must_use]
    pub fn global_start(&self, dim: usize) -> usize {
        self.g_strt.get(dim).copied().unwrap_or(0)
    }

    /// Total number of local zones including guard, `prod(l_ntot)`.
    #[must_use]
    pub fn num_local_zones(&self) -> usize {
        self.l_ntot[0] * self.l_ntot[1] * self.l_ntot[2]
    }

    /// Total number of local interior zones, `prod(l_nint)`.
    #[must_use]
    pub fn num_local_interior_zones(&self) -> usize {
        self.l_nint[0] * self.l_nint[1] * self.l_nint[2]
    }

    /// Total number of global zones, `prod(g_ntot)`.
    #[must_use]
    pub fn num_global_zones(&self) -> usize {
        self.g_ntot[0] * self.g_ntot[1] * self.g_ntot[2]
    }

    /// Process-grid extents.
    #[must_use]
    pub fn proc_sizes(&self) -> [usize; 3] {
        self.proc_sizes
    }

    /// This process's coordinates in the process grid.
    #[must_use]
    pub fn proc_index(&self) -> [usize; 3] {
        self.proc_index
    }

    /// Local extent (interior + guard) array, `[Lx,Ly,Lz]`.
    #[must_use]
    pub fn l_ntot(&self) -> [usize; 3] {
        self.l_ntot
    }

    /// Local interior extent array.
    #[must_use]
    pub fn l_nint(&self) -> [usize; 3] {
        self.l_nint
    }

    pub(crate) fn topology(&self) -> Option<&dyn CartesianTopology> {
        self.topology.as_deref()
    }

    /// Assemble the full global interior array from every rank's local
    /// interior block (no guard zones). On the single-process group this
    /// is a no-op copy; under a real transport it is a collective gather.
    /// Used by the distributed FFT plan.
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if this Domain has not been
    /// committed, or [`Error::PeerFailure`] if the gather fails.
    pub fn gather_global_interior(&self, local_interior: &[f64]) -> Result<Vec<f64>> {
        let topology = self.topology.as_deref().ok_or(Error::NotCommitted)?;
        topology.gather_global(local_interior, self.l_nint, self.g_strt, self.g_ntot)
    }

    /// The process group this Domain is bound to. Used by collaborators
    /// (e.g. the histogram accumulator) that need a collective reduction
    /// scoped to the same group the Domain decomposes over.
    #[must_use]
    pub fn process_group(&self) -> &dyn ProcessGroup {
        self.process_group.as_ref()
    }
}

/// Every offset in `{-1,0,1}^n_dims` except the all-zero one, in a fixed
/// order shared by every dimensionality so the neighbor counter always
/// starts at zero regardless of `n_dims`.
pub(crate) fn neighbor_offsets(n_dims: usize) -> Vec<[i32; 3]> {
    let mut out = Vec::with_capacity(3usize.pow(n_dims as u32) - 1);
    let ranges: [i32; 3] = [-1, 0, 1];
    let dz = if n_dims > 2 { &ranges[..] } else { &ranges[1..2] };
    let dy = if n_dims > 1 { &ranges[..] } else { &ranges[1..2] };
    for &dx in &ranges {
        for &dyv in dy {
            for &dzv in dz {
                if dx == 0 && dyv == 0 && dzv == 0 {
                    continue;
                }
                out.push([dx, dyv, dzv]);
            }
        }
    }
    out
}

/// `tag(Δ) = Σᵢ 10^(n_dims-1-i) · (Δᵢ+5)`.
pub(crate) fn tag_of(n_dims: usize, offset: [i32; 3]) -> i32 {
    let mut tag = 0i32;
    for i in 0..n_dims {
        let place = 10i32.pow((n_dims - 1 - i) as u32);
        tag += place * (offset[i] + 5);
    }
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_a_decomposition_arithmetic() {
        // G_ntot=(12,13,14), 4 ranks laid out as (2,2,1).
        for (idx, (l_nint, g_strt)) in [
            ((0usize, 0usize, 0usize), ([6usize, 7, 14], [0usize, 0, 0])),
            ((1, 1, 0), ([6, 6, 14], [6, 7, 0])),
        ] {
            let p = [2usize, 2, 1];
            let total = [12usize, 13, 14];
            let mut l = [0usize; 3];
            let mut s = [0usize; 3];
            for i in 0..3 {
                let q = total[i] / p[i];
                let r = total[i] % p[i];
                let coord = [idx.0, idx.1, idx.2][i];
                l[i] = if coord < r { q + 1 } else { q };
                let before_r = coord.min(r);
                s[i] = before_r * (q + 1) + coord.saturating_sub(r) * q;
            }
            assert_eq!(l, l_nint);
            assert_eq!(s, g_strt);
        }
    }

    #[test]
    fn single_process_commit_covers_whole_domain() {
        let mut d = Domain::new();
        d.set_ndim(3);
        d.set_guard(2);
        d.set_size(0, 8);
        d.set_size(1, 8);
        d.set_size(2, 8);
        d.commit().unwrap();
        assert_eq!(d.l_nint(), [8, 8, 8]);
        assert_eq!(d.l_ntot(), [12, 12, 12]);
        assert_eq!(d.global_start(0), 0);
        assert!(d.neighbors().is_empty());
    }

    #[test]
    fn setters_noop_after_commit() {
        let mut d = Domain::new();
        d.set_size(0, 4);
        d.commit().unwrap();
        d.set_size(0, 99);
        assert_eq!(d.global_size(0), 4);
    }

    #[test]
    fn scenario_f_tag_formula_2d() {
        // proc_index=(0,0), offset (+1,0): send=65, recv=45.
        assert_eq!(tag_of(2, [1, 0, 0]), 65);
        assert_eq!(tag_of(2, [-1, 0, 0]), 45);
    }

    #[test]
    fn neighbor_offsets_counts() {
        assert_eq!(neighbor_offsets(1).len(), 2);
        assert_eq!(neighbor_offsets(2).len(), 8);
        assert_eq!(neighbor_offsets(3).len(), 26);
    }
}
