// crates/amrcc-core/src/engine.rs

//! Pipeline stages over the block master: block construction, threshold
//! resolution, initialisation, and the exchange loop.

use crate::block::{ComponentBlock, FabPatch, IntegralValue};
use crate::error::{Error, Result};
use crate::grid::Bounds;
use crate::protocol;
use crate::vertex::AmrVertexId;
use amrcc_runtime::Master;
use tracing::info;

/// Wrap reader patches into component blocks and register them.
pub fn add_patches(
    master: &mut Master<ComponentBlock>,
    patches: Vec<FabPatch>,
    domain: Bounds,
    negate: bool,
    cell_volume: f64,
) -> Result<()> {
    for patch in patches {
        let gid = patch.gid;
        let block = ComponentBlock::new(patch, domain, negate, cell_volume)?;
        master.add_block(gid, block);
    }
    Ok(())
}

/// Resolve the absolute threshold. In relative mode the blocks' scaled sums
/// and unmasked counts are all-reduced and the threshold becomes
/// `rho * mean`; a bad mean aborts the run.
pub fn resolve_threshold(
    master: &mut Master<ComponentBlock>,
    rho: f64,
    absolute: bool,
) -> Result<f64> {
    if absolute {
        return Ok(rho);
    }
    if master.is_empty() {
        return Err(Error::Config("no blocks to compute a mean over".into()));
    }

    master.foreach(|b: &mut ComponentBlock, proxy| -> Result<()> {
        proxy.all_reduce(b.sum * b.scaling_factor());
        proxy.all_reduce(b.n_unmasked as f64 * b.scaling_factor());
        Ok(())
    })?;
    master.exchange().map_err(Error::from)?;

    let reduced = master.reduced();
    let total_sum = reduced[0];
    let total_unmasked = reduced[1];
    let mean = total_sum / total_unmasked;

    info!(total_sum, total_unmasked, mean, rho, "resolved global mean");

    if !mean.is_finite() || mean <= 0.0 || mean > 1e40 {
        return Err(Error::Numerical(format!("bad mean {mean}, do not proceed")));
    }
    Ok(rho * mean)
}

/// Initialise every block against the resolved threshold: LOW cells, local
/// trees, outgoing edges, components. Reduced cell statistics are logged for
/// run diagnostics.
pub fn init_blocks(master: &mut Master<ComponentBlock>, absolute_rho: f64) -> Result<()> {
    master.foreach(|b: &mut ComponentBlock, proxy| -> Result<()> {
        b.init(absolute_rho)?;
        proxy.all_reduce(b.sum_active * b.scaling_factor());
        proxy.all_reduce(b.sum_low * b.scaling_factor());
        proxy.all_reduce(b.n_active as f64);
        proxy.all_reduce(b.n_low as f64);
        proxy.all_reduce(b.n_masked as f64);
        Ok(())
    })?;
    master.exchange().map_err(Error::from)?;

    let reduced = master.reduced();
    info!(
        absolute_rho,
        sum_active = reduced[0],
        sum_low = reduced[1],
        n_active = reduced[2],
        n_low = reduced[3],
        n_masked = reduced[4],
        "blocks initialized"
    );
    Ok(())
}

/// Symmetrise edges, then run exchange rounds until the all-reduced undone
/// count reaches zero. Returns the number of rounds.
pub fn compute_tree(master: &mut Master<ComponentBlock>) -> Result<u32> {
    master.foreach(protocol::send_edges_to_neighbors)?;
    master.exchange().map_err(Error::from)?;
    master.foreach(protocol::delete_low_edges)?;

    let mut rounds = 0u32;
    loop {
        rounds += 1;
        master.foreach(protocol::cc_send)?;
        master.exchange().map_err(Error::from)?;
        master.foreach(protocol::cc_receive)?;
        master.exchange().map_err(Error::from)?;

        let undone = master.reduced().first().copied().unwrap_or(0.0);
        info!(rounds, undone, "exchange round complete");
        if undone == 0.0 {
            break;
        }
    }
    Ok(rounds)
}

/// Freeze the converged component assignment, integrate active cells, and
/// ship contributions of remotely rooted components to the root's owner so
/// multi-block halos report global totals.
pub fn finalize_components(master: &mut Master<ComponentBlock>) -> Result<()> {
    master.foreach(|b: &mut ComponentBlock, _proxy| -> Result<()> {
        b.compute_final_connected_components();
        b.compute_local_integral();
        Ok(())
    })?;

    master.foreach(|b: &mut ComponentBlock, proxy| -> Result<()> {
        let remote: Vec<(AmrVertexId, IntegralValue)> = b
            .local_integral
            .iter()
            .filter(|(root, _)| root.gid != b.gid)
            .map(|(root, v)| (*root, v.clone()))
            .collect();
        for (root, value) in remote {
            proxy.enqueue(root.gid, &(root, value)).map_err(Error::from)?;
            b.local_integral.remove(&root);
        }
        Ok(())
    })?;
    master.exchange().map_err(Error::from)?;
    master.foreach(|b: &mut ComponentBlock, proxy| -> Result<()> {
        let incoming: Vec<(i32, (AmrVertexId, IntegralValue))> =
            proxy.take_incoming().map_err(Error::from)?;
        for (_sender, (root, value)) in incoming {
            b.local_integral.entry(root).or_default().merge(&value);
        }
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_patch(gid: i32, core: Bounds, value: f64) -> FabPatch {
        FabPatch {
            gid,
            level: 0,
            refinement: 1,
            core,
            bounds: core,
            field: vec![value; core.size() as usize],
            extra_names: Vec::new(),
            extras: Vec::new(),
            links: Vec::new(),
        }
    }

    #[test]
    fn absolute_threshold_passes_through() {
        let mut master: Master<ComponentBlock> = Master::new();
        assert_eq!(resolve_threshold(&mut master, 81.66, true).unwrap(), 81.66);
    }

    #[test]
    fn relative_threshold_is_rho_times_mean() {
        let domain = Bounds::new([0, 0, 0], [3, 3, 3]);
        let mut master = Master::new();
        let patches = vec![
            flat_patch(0, Bounds::new([0, 0, 0], [3, 3, 1]), 1.0),
            flat_patch(1, Bounds::new([0, 0, 2], [3, 3, 3]), 3.0),
        ];
        add_patches(&mut master, patches, domain, false, 1.0).unwrap();

        // mean = (32 * 1 + 32 * 3) / 64 = 2.
        let rho = resolve_threshold(&mut master, 0.5, false).unwrap();
        assert_eq!(rho, 1.0);
    }

    #[test]
    fn zero_mean_is_a_numerical_error() {
        let domain = Bounds::new([0, 0, 0], [3, 3, 3]);
        let mut master = Master::new();
        add_patches(&mut master, vec![flat_patch(0, domain, 0.0)], domain, true, 1.0).unwrap();

        let err = resolve_threshold(&mut master, 1.0, false).unwrap_err();
        assert!(matches!(err, Error::Numerical(_)));
    }

    #[test]
    fn relative_mode_needs_blocks() {
        let mut master: Master<ComponentBlock> = Master::new();
        let err = resolve_threshold(&mut master, 1.0, false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
