//! # Tree Fixtures
//!
//! A fully-shaped driver tree (N psocs of M vdevs each) with handles to
//! every node, built and torn down in the only legal order.

use std::sync::Arc;

use anyhow::{Context, Result};

use dsc_core::{DscConfig, SystemStatus};
use dsc_sync::{Driver, Node, NodePath, Psoc, Vdev};

/// Handles to every node of one driver tree.
#[derive(Debug)]
pub struct TreeFixture {
    pub driver: Driver,
    pub psocs: Vec<Psoc>,
    /// `vdevs[i]` are the vdevs of `psocs[i]`, in creation order.
    pub vdevs: Vec<Vec<Vdev>>,
}

impl TreeFixture {
    /// Build a driver with `psocs` psocs of `vdevs` vdevs each.
    pub fn build(
        status: Arc<SystemStatus>,
        config: DscConfig,
        psocs: usize,
        vdevs: usize,
    ) -> Result<Self> {
        let driver = Driver::create(status, config).context("driver create failed")?;
        let mut fixture = Self {
            driver,
            psocs: Vec::with_capacity(psocs),
            vdevs: Vec::with_capacity(psocs),
        };
        for _ in 0..psocs {
            let psoc = Psoc::create(&fixture.driver).context("psoc create failed")?;
            let children = (0..vdevs)
                .map(|_| Vdev::create(&psoc).context("vdev create failed"))
                .collect::<Result<Vec<_>>>()?;
            fixture.psocs.push(psoc);
            fixture.vdevs.push(children);
        }
        Ok(fixture)
    }

    /// Every node, in structural order.
    pub fn nodes(&self) -> Vec<&dyn Node> {
        let mut nodes: Vec<&dyn Node> = Vec::new();
        nodes.push(&self.driver);
        for (psoc, vdevs) in self.psocs.iter().zip(&self.vdevs) {
            nodes.push(psoc);
            nodes.extend(vdevs.iter().map(|v| v as &dyn Node));
        }
        nodes
    }

    /// Resolve a `driver`, `psoc:<i>` or `vdev:<i>:<j>` selector, where the
    /// indices count psocs and vdevs in creation order.
    pub fn select(&self, selector: &str) -> Result<&dyn Node> {
        let parts: Vec<&str> = selector.split(':').collect();
        let index = |s: &str| -> Result<usize> {
            s.parse()
                .with_context(|| format!("invalid index {s:?} in {selector:?}"))
        };
        match parts.as_slice() {
            ["driver"] => Ok(&self.driver as &dyn Node),
            ["psoc", i] => {
                let i = index(*i)?;
                self.psocs
                    .get(i)
                    .map(|p| p as &dyn Node)
                    .with_context(|| format!("no psoc {i}"))
            }
            ["vdev", i, j] => {
                let (i, j) = (index(*i)?, index(*j)?);
                self.vdevs
                    .get(i)
                    .and_then(|vdevs| vdevs.get(j))
                    .map(|v| v as &dyn Node)
                    .with_context(|| format!("no vdev {j} under psoc {i}"))
            }
            _ => anyhow::bail!(
                "invalid node selector {selector:?}: expected driver, psoc:<i> or vdev:<i>:<j>"
            ),
        }
    }

    /// Paths of every node that currently holds an active transition.
    pub fn active_paths(&self) -> Vec<NodePath> {
        self.nodes()
            .into_iter()
            .filter(|n| n.is_trans_active())
            .map(|n| n.path())
            .collect()
    }

    /// Destroy every node, leaves first.
    pub fn teardown(self) {
        for (psoc, vdevs) in self.psocs.into_iter().zip(self.vdevs) {
            for vdev in vdevs {
                vdev.destroy();
            }
            psoc.destroy();
        }
        self.driver.destroy();
    }
}
