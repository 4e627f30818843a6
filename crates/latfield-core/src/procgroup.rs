//! Process-group abstraction.
//!
//! Everything above this module is written against [`ProcessGroup`] and
//! [`CartesianTopology`], never against a concrete transport. Two
//! implementations ship: [`SingleProcessGroup`], always available, and
//! [`MpiProcessGroup`], gated behind the `mpi` feature.

use crate::error::{Error, Result};

/// Query surface for "who am I, how many of us are there, how do I factor
/// my process count into a grid."
pub trait ProcessGroup: std::fmt::Debug {
    /// This process's rank within the group.
    fn rank(&self) -> usize;

    /// Total number of processes in the group.
    fn size(&self) -> usize;

    /// Fill any zero entries of `proc_sizes[..n_dims]` so that
    /// `prod(proc_sizes[..n_dims]) == self.size()`, keeping already-pinned
    /// (nonzero) entries untouched and balancing the remaining factors as
    /// evenly as possible.
    ///
    /// # Errors
    /// Returns [`Error::DecompositionImpossible`] if no such factoring
    /// exists.
    fn factor_dims(&self, n_dims: usize, proc_sizes: &mut [usize; 3]) -> Result<()>;

    /// Build a periodic Cartesian topology of the given shape over this
    /// group. `proc_sizes[..n_dims]` must already be fully pinned (see
    /// [`ProcessGroup::factor_dims`]) and its product must equal
    /// [`ProcessGroup::size`].
    ///
    /// # Errors
    /// Returns [`Error::DecompositionImpossible`] if the shape does not
    /// match the group size.
    fn cartesian(
        &self,
        n_dims: usize,
        proc_sizes: [usize; 3],
    ) -> Result<Box<dyn CartesianTopology>>;

    /// Sum `data` element-wise across every process in the group, in
    /// place. Used by the histogram accumulator's `seal` reduction; a
    /// no-op on a single-process group.
    ///
    /// # Errors
    /// Returns [`Error::PeerFailure`] if the underlying transport reports
    /// a failure.
    fn all_reduce_sum(&self, data: &mut [f64]) -> Result<()>;
}

/// A periodic Cartesian process topology plus point-to-point exchange.
///
/// Implementors pack/unpack plain `f64` slabs rather than exposing typed
/// derived-datatype handles; see the guard-exchange design note this type
/// exists to serve.
pub trait CartesianTopology: std::fmt::Debug {
    /// Dimensionality of the topology (1, 2, or 3).
    fn n_dims(&self) -> usize;

    /// This process's coordinates in the process grid.
    fn coords(&self) -> [usize; 3];

    /// Shape of the process grid.
    fn proc_sizes(&self) -> [usize; 3];

    /// This process's rank within the topology (equal to the owning
    /// group's rank).
    fn rank(&self) -> usize;

    /// Translate a coordinate offset (each component in `{-1,0,1}`) into
    /// the rank of the neighbor at that offset, wrapping periodically.
    /// Returns this process's own rank when the topology is degenerate
    /// along every axis the offset touches (e.g. `proc_sizes[i] == 1`).
    fn neighbor_rank(&self, offset: [i32; 3]) -> usize;

    /// Exchange flat `f64` buffers with neighbor ranks.
    ///
    /// `sends[i] = (dest_rank, tag, data)`, `recvs[i] = (src_rank, tag, buf)`.
    /// Implementations must post every receive before posting the matching
    /// send so that non-blocking transports cannot deadlock; buffers with
    /// `dest_rank`/`src_rank` equal to [`CartesianTopology::rank`] are
    /// copied directly rather than routed through the transport.
    ///
    /// # Errors
    /// Returns [`Error::PeerFailure`] if the underlying transport reports
    /// a failure. Treated as fatal by callers.
    fn exchange(
        &self,
        sends: &[(usize, i32, &[f64])],
        recvs: &mut [(usize, i32, &mut [f64])],
    ) -> Result<()>;

    /// Assemble the full global array from every rank's local interior
    /// block. Used by the distributed FFT plan, which gathers the whole
    /// domain onto every rank rather than transposing pencils; see the
    /// design note on that tradeoff.
    ///
    /// # Errors
    /// Returns [`Error::PeerFailure`] if the underlying transport reports
    /// a failure.
    fn gather_global(
        &self,
        local: &[f64],
        local_shape: [usize; 3],
        local_start: [usize; 3],
        global_shape: [usize; 3],
    ) -> Result<Vec<f64>>;
}

/// Greatest-to-least balanced factoring of `remaining` into the unpinned
/// slots of `proc_sizes[..n_dims]`.
fn balance_factor(size: usize, n_dims: usize, proc_sizes: &mut [usize; 3]) -> Result<()> {
    let pinned_product: usize = proc_sizes[..n_dims].iter().filter(|&&v| v != 0).product();
    if pinned_product == 0 {
        return Err(Error::DecompositionImpossible {
            size,
            n_dims,
            proc_sizes: *proc_sizes,
        });
    }
    if size % pinned_product != 0 {
        return Err(Error::DecompositionImpossible {
            size,
            n_dims,
            proc_sizes: *proc_sizes,
        });
    }
    let mut remaining = size / pinned_product;
    let free: Vec<usize> = (0..n_dims).filter(|&i| proc_sizes[i] == 0).collect();
    if free.is_empty() {
        return if remaining == 1 {
            Ok(())
        } else {
            Err(Error::DecompositionImpossible {
                size,
                n_dims,
                proc_sizes: *proc_sizes,
            })
        };
    }
    // Greedily assign factors of `remaining` from largest to smallest to the
    // free slots, biggest slot first, so the result is as square as possible.
    for &i in free.iter().rev().skip(1) {
        let mut factor = 1;
        let mut candidate = (remaining as f64).sqrt().floor() as usize;
        candidate = candidate.max(1);
        while candidate >= 1 {
            if remaining % candidate == 0 {
                factor = candidate;
                break;
            }
            candidate -= 1;
        }
        proc_sizes[i] = factor;
        remaining /= factor;
    }
    if let Some(&last) = free.first() {
        proc_sizes[last] = remaining;
    }
    if proc_sizes[..n_dims].iter().product::<usize>() != size {
        return Err(Error::DecompositionImpossible {
            size,
            n_dims,
            proc_sizes: *proc_sizes,
        });
    }
    Ok(())
}

/// Always-available single-process group: `proc_sizes = [1,1,1]`, every
/// neighbor offset wraps back to this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcessGroup;

impl ProcessGroup for SingleProcessGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn factor_dims(&self, n_dims: usize, proc_sizes: &mut [usize; 3]) -> Result<()> {
        for slot in proc_sizes.iter_mut().take(n_dims) {
            *slot = 1;
        }
        Ok(())
    }

    fn cartesian(
        &self,
        n_dims: usize,
        proc_sizes: [usize; 3],
    ) -> Result<Box<dyn CartesianTopology>> {
        if proc_sizes[..n_dims].iter().product::<usize>() != 1 {
            return Err(Error::DecompositionImpossible {
                size: 1,
                n_dims,
                proc_sizes,
            });
        }
        Ok(Box::new(SingleTopology { n_dims, proc_sizes }))
    }

    fn all_reduce_sum(&self, _data: &mut [f64]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SingleTopology {
    n_dims: usize,
    proc_sizes: [usize; 3],
}

impl CartesianTopology for SingleTopology {
    fn n_dims(&self) -> usize {
        self.n_dims
    }

    fn coords(&self) -> [usize; 3] {
        [0, 0, 0]
    }

    fn proc_sizes(&self) -> [usize; 3] {
        self.proc_sizes
    }

    fn rank(&self) -> usize {
        0
    }

    fn neighbor_rank(&self, _offset: [i32; 3]) -> usize {
        0
    }

    fn exchange(
        &self,
        sends: &[(usize, i32, &[f64])],
        recvs: &mut [(usize, i32, &mut [f64])],
    ) -> Result<()> {
        // Every neighbor is this rank itself. A real transport matches a
        // send to a recv by (peer rank, tag); here the peer is always us,
        // so match by tag alone, mirroring the symmetric tag formula that
        // makes `send_tag` of one neighbor link equal `recv_tag` of its
        // reciprocal.
        for (recv_rank, recv_tag, buf) in recvs.iter_mut() {
            let matched = sends
                .iter()
                .find(|(dest_rank, send_tag, _)| dest_rank == recv_rank && send_tag == recv_tag);
            if let Some((_, _, data)) = matched {
                debug_assert_eq!(data.len(), buf.len());
                buf.copy_from_slice(data);
            } else {
                return Err(Error::PeerFailure(format!(
                    "no send matched recv tag {recv_tag} from rank {recv_rank}"
                )));
            }
        }
        Ok(())
    }

    fn gather_global(
        &self,
        local: &[f64],
        _local_shape: [usize; 3],
        _local_start: [usize; 3],
        _global_shape: [usize; 3],
    ) -> Result<Vec<f64>> {
        Ok(local.to_vec())
    }
}

#[cfg(feature = "mpi")]
pub mod mpi_backend {
    //! Real-MPI-backed [`ProcessGroup`]/[`CartesianTopology`], gated behind
    //! the `mpi` feature. Compiled only when the `mpi-fork-fnsp` crate and a
    //! working MPI installation are available at build time.
    use super::{balance_factor, CartesianTopology, ProcessGroup};
    use crate::error::{Error, Result};
    use mpi::topology::{Communicator, SimpleCommunicator};

    /// `ProcessGroup` wrapping `MPI_COMM_WORLD`.
    #[derive(Debug)]
    pub struct MpiProcessGroup {
        world: SimpleCommunicator,
    }

    impl MpiProcessGroup {
        /// Wrap the world communicator. The caller owns the `mpi::Universe`
        /// for the process lifetime.
        #[must_use]
        pub fn new(world: SimpleCommunicator) -> Self {
            Self { world }
        }
    }

    impl ProcessGroup for MpiProcessGroup {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn factor_dims(&self, n_dims: usize, proc_sizes: &mut [usize; 3]) -> Result<()> {
            balance_factor(self.size(), n_dims, proc_sizes)
        }

        fn cartesian(
            &self,
            n_dims: usize,
            proc_sizes: [usize; 3],
        ) -> Result<Box<dyn CartesianTopology>> {
            if proc_sizes[..n_dims].iter().product::<usize>() != self.size() {
                return Err(Error::DecompositionImpossible {
                    size: self.size(),
                    n_dims,
                    proc_sizes,
                });
            }
            let dims: Vec<i32> = proc_sizes[..n_dims].iter().map(|&d| d as i32).collect();
            let periods = vec![true; n_dims];
            let cart = self
                .world
                .create_cartesian_communicator(&dims, &periods, false)
                .ok_or_else(|| Error::PeerFailure("MPI_Cart_create failed".into()))?;
            Ok(Box::new(MpiTopology {
                cart,
                n_dims,
                proc_sizes,
            }))
        }

        fn all_reduce_sum(&self, data: &mut [f64]) -> Result<()> {
            use mpi::collective::SystemOperation;
            use mpi::traits::CommunicatorCollectives;
            let input = data.to_vec();
            self.world
                .all_reduce_into(&input[..], data, SystemOperation::sum());
            Ok(())
        }
    }

    struct MpiTopology {
        cart: mpi::topology::CartesianCommunicator,
        n_dims: usize,
        proc_sizes: [usize; 3],
    }

    impl std::fmt::Debug for MpiTopology {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MpiTopology")
                .field("n_dims", &self.n_dims)
                .field("proc_sizes", &self.proc_sizes)
                .finish()
        }
    }

    impl CartesianTopology for MpiTopology {
        fn n_dims(&self) -> usize {
            self.n_dims
        }

        fn coords(&self) -> [usize; 3] {
            let layout = self.cart.get_layout();
            let mut out = [0usize; 3];
            for (i, c) in layout.coords.iter().enumerate().take(self.n_dims) {
                out[i] = *c as usize;
            }
            out
        }

        fn proc_sizes(&self) -> [usize; 3] {
            self.proc_sizes
        }

        fn rank(&self) -> usize {
            self.cart.rank() as usize
        }

        fn neighbor_rank(&self, offset: [i32; 3]) -> usize {
            let coords = self.coords();
            let sizes = self.proc_sizes;
            let mut target = [0i32; 3];
            for i in 0..self.n_dims {
                let s = sizes[i] as i32;
                target[i] = (coords[i] as i32 + offset[i]).rem_euclid(s);
            }
            self.cart.rank_from_coords(&target[..self.n_dims]) as usize
        }

        fn exchange(
            &self,
            sends: &[(usize, i32, &[f64])],
            recvs: &mut [(usize, i32, &mut [f64])],
        ) -> Result<()> {
            use mpi::request::WaitGuard;

            mpi::request::scope(|scope| {
                let mut requests = Vec::new();
                for (src, tag, buf) in recvs.iter_mut() {
                    if *src == self.rank() {
                        continue;
                    }
                    let peer = self.cart.process_at_rank(*src as i32);
                    requests.push(WaitGuard::from(
                        peer.immediate_receive_into_with_tag(scope, *buf, *tag),
                    ));
                }
                for (dest, tag, data) in sends {
                    if *dest == self.rank() {
                        continue;
                    }
                    let peer = self.cart.process_at_rank(*dest as i32);
                    requests.push(WaitGuard::from(
                        peer.immediate_send_with_tag(scope, *data, *tag),
                    ));
                }
                drop(requests);
            });

            // Same-rank pairs never touch the transport; copy directly.
            for (send, recv) in sends.iter().zip(recvs.iter_mut()) {
                let (dest, _, data) = send;
                let (src, _, buf) = recv;
                if *dest == self.rank() && *src == self.rank() {
                    buf.copy_from_slice(data);
                }
            }
            Ok(())
        }

        fn gather_global(
            &self,
            local: &[f64],
            local_shape: [usize; 3],
            local_start: [usize; 3],
            global_shape: [usize; 3],
        ) -> Result<Vec<f64>> {
            use mpi::datatype::PartitionMut;
            use mpi::traits::CommunicatorCollectives;

            let size = self.cart.size() as usize;

            // Fixed-size metadata exchange: every rank always contributes
            // exactly 6 values, so a plain all_gather suffices here (the
            // variable part is the data itself, handled below).
            let mut meta = [0i64; 6];
            for i in 0..3 {
                meta[i] = local_start[i] as i64;
                meta[3 + i] = local_shape[i] as i64;
            }
            let mut all_meta = vec![0i64; 6 * size];
            self.cart.all_gather_into(&meta[..], &mut all_meta[..]);

            let counts: Vec<i32> = (0..size)
                .map(|r| {
                    let shape = &all_meta[6 * r + 3..6 * r + 6];
                    (shape[0] * shape[1] * shape[2]) as i32
                })
                .collect();
            let displs: Vec<i32> = counts
                .iter()
                .scan(0i32, |acc, &c| {
                    let d = *acc;
                    *acc += c;
                    Some(d)
                })
                .collect();
            let total: i32 = counts.iter().sum();
            let mut gathered = vec![0.0f64; total as usize];
            {
                let partition = PartitionMut::new(&mut gathered[..], counts.clone(), displs.clone());
                self.cart.all_gather_varcount_into(local, partition);
            }

            let mut global = vec![0.0f64; global_shape[0] * global_shape[1] * global_shape[2]];
            let gy = global_shape[1];
            let gz = global_shape[2];
            for r in 0..size {
                let strt = [
                    all_meta[6 * r] as usize,
                    all_meta[6 * r + 1] as usize,
                    all_meta[6 * r + 2] as usize,
                ];
                let shape = [
                    all_meta[6 * r + 3] as usize,
                    all_meta[6 * r + 4] as usize,
                    all_meta[6 * r + 5] as usize,
                ];
                let off = displs[r] as usize;
                let mut k = 0usize;
                for x in 0..shape[0] {
                    for y in 0..shape[1] {
                        for z in 0..shape[2] {
                            let gi = (strt[0] + x) * gy * gz + (strt[1] + y) * gz + (strt[2] + z);
                            global[gi] = gathered[off + k];
                            k += 1;
                        }
                    }
                }
            }
            Ok(global)
        }
    }
}

#[cfg(feature = "mpi")]
pub use mpi_backend::MpiProcessGroup;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_process_factors_to_ones() {
        let pg = SingleProcessGroup;
        let mut sizes = [0usize; 3];
        pg.factor_dims(3, &mut sizes).unwrap();
        assert_eq!(sizes, [1, 1, 1]);
    }

    #[test]
    fn balance_factor_pins_and_fills() {
        let mut sizes = [2, 0, 0];
        balance_factor(8, 3, &mut sizes).unwrap();
        assert_eq!(sizes[0], 2);
        assert_eq!(sizes.iter().product::<usize>(), 8);
    }

    #[test]
    fn balance_factor_rejects_impossible_shape() {
        let mut sizes = [3, 0, 0];
        assert!(balance_factor(8, 3, &mut sizes).is_err());
    }
}
