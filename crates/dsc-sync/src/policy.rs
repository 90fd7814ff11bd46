//! # Cross-Level Admission Policy
//!
//! Decides, for a candidate transition or operation on one node, whether an
//! ancestor, the node itself, or a descendant blocks it, and how:
//!
//! | Level | Transition blocked by | Operation blocked by |
//! |---|---|---|
//! | Driver | own active-or-queued (`Again`); any psoc/vdev active (`Again`) | own active (`Again`) |
//! | Psoc | driver active-or-queued (`Invalid`); own active-or-queued or any vdev active (`Again`) | driver active (`Invalid`); own active (`Again`) |
//! | Vdev | driver active-or-queued (`Invalid`); recovering (`Invalid`); psoc active-or-queued (`Invalid` while unloading, else `Again`); own active-or-queued (`Again`) | driver or psoc active (`Invalid`); own active (`Again`) |
//!
//! A transition anywhere blocks same-level and ancestor activity and blocks
//! or defers descendant activity. Sibling subtrees stay independent.
//!
//! Every function here runs under the driver lock.

use dsc_core::{Blocker, DscError, PsocId, Rejection, SystemStatus, VdevId};

use crate::tree::{NodePath, PsocNode, Tree, VdevNode};

const DESTROYED: DscError = DscError::Invalid(Rejection::Destroyed);

/// Whether a transition may start on `path` right now.
pub(crate) fn can_trans(tree: &Tree, path: NodePath, status: &SystemStatus) -> Result<(), DscError> {
    if tree.destroyed {
        return Err(DESTROYED);
    }
    match path {
        NodePath::Driver => driver_can_trans(tree),
        NodePath::Psoc(psoc) => psoc_can_trans(tree, resolve_psoc(tree, psoc)?),
        NodePath::Vdev(psoc, vdev) => {
            let (psoc, vdev) = resolve_vdev(tree, psoc, vdev)?;
            vdev_can_trans(tree, psoc, vdev, status)
        }
    }
}

/// Whether an operation may start on `path` right now.
pub(crate) fn can_op(tree: &Tree, path: NodePath) -> Result<(), DscError> {
    if tree.destroyed {
        return Err(DESTROYED);
    }
    match path {
        NodePath::Driver => driver_can_op(tree),
        NodePath::Psoc(psoc) => psoc_can_op(tree, resolve_psoc(tree, psoc)?),
        NodePath::Vdev(psoc, vdev) => {
            let (psoc, vdev) = resolve_vdev(tree, psoc, vdev)?;
            vdev_can_op(tree, psoc, vdev)
        }
    }
}

/// Whether `path` or one of its ancestors holds an active transition.
pub(crate) fn is_protected(tree: &Tree, path: NodePath) -> bool {
    if tree.destroyed {
        return false;
    }
    let driver = tree.driver.trans.is_active();
    match path {
        NodePath::Driver => driver,
        NodePath::Psoc(psoc) => {
            driver || tree.psoc(psoc).is_some_and(|p| p.sync.trans.is_active())
        }
        NodePath::Vdev(psoc, vdev) => {
            let Some(p) = tree.psoc(psoc) else {
                return false;
            };
            driver
                || p.sync.trans.is_active()
                || p.vdev(vdev).is_some_and(|v| v.sync.trans.is_active())
        }
    }
}

fn resolve_psoc(tree: &Tree, psoc: PsocId) -> Result<&PsocNode, DscError> {
    tree.psoc(psoc).ok_or(DESTROYED)
}

fn resolve_vdev(tree: &Tree, psoc: PsocId, vdev: VdevId) -> Result<(&PsocNode, &VdevNode), DscError> {
    let psoc = resolve_psoc(tree, psoc)?;
    let vdev = psoc.vdev(vdev).ok_or(DESTROYED)?;
    Ok((psoc, vdev))
}

fn driver_can_trans(tree: &Tree) -> Result<(), DscError> {
    if tree.driver.trans.is_active_or_queued() {
        return Err(DscError::Again(Blocker::OwnTransition));
    }
    if tree.any_descendant_active() {
        return Err(DscError::Again(Blocker::DescendantTransition));
    }
    Ok(())
}

fn driver_can_op(tree: &Tree) -> Result<(), DscError> {
    if tree.driver.trans.is_active() {
        return Err(DscError::Again(Blocker::OwnTransition));
    }
    Ok(())
}

fn psoc_can_trans(tree: &Tree, psoc: &PsocNode) -> Result<(), DscError> {
    if tree.driver.trans.is_active_or_queued() {
        return Err(DscError::Invalid(Rejection::DriverTransition));
    }
    if psoc.sync.trans.is_active_or_queued() {
        return Err(DscError::Again(Blocker::OwnTransition));
    }
    if psoc.any_vdev_active() {
        return Err(DscError::Again(Blocker::DescendantTransition));
    }
    Ok(())
}

fn psoc_can_op(tree: &Tree, psoc: &PsocNode) -> Result<(), DscError> {
    if tree.driver.trans.is_active() {
        return Err(DscError::Invalid(Rejection::DriverTransition));
    }
    if psoc.sync.trans.is_active() {
        return Err(DscError::Again(Blocker::OwnTransition));
    }
    Ok(())
}

fn vdev_can_trans(
    tree: &Tree,
    psoc: &PsocNode,
    vdev: &VdevNode,
    status: &SystemStatus,
) -> Result<(), DscError> {
    if tree.driver.trans.is_active_or_queued() {
        return Err(DscError::Invalid(Rejection::DriverTransition));
    }
    if status.is_recovering() {
        return Err(DscError::Invalid(Rejection::Recovering));
    }
    if psoc.sync.trans.is_active_or_queued() {
        // While unloading, waiting behind the psoc would only delay teardown.
        if status.is_unloading() {
            return Err(DscError::Invalid(Rejection::PsocTransition));
        }
        return Err(DscError::Again(Blocker::PsocTransition));
    }
    if vdev.sync.trans.is_active_or_queued() {
        return Err(DscError::Again(Blocker::OwnTransition));
    }
    Ok(())
}

fn vdev_can_op(tree: &Tree, psoc: &PsocNode, vdev: &VdevNode) -> Result<(), DscError> {
    if tree.driver.trans.is_active() {
        return Err(DscError::Invalid(Rejection::DriverTransition));
    }
    if psoc.sync.trans.is_active() {
        return Err(DscError::Invalid(Rejection::PsocTransition));
    }
    if vdev.sync.trans.is_active() {
        return Err(DscError::Again(Blocker::OwnTransition));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Shared;

    struct Fixture {
        shared: Shared,
        psocs: Vec<PsocId>,
        vdevs: Vec<(PsocId, VdevId)>,
    }

    /// One driver, two psocs, two vdevs per psoc.
    fn fixture() -> Fixture {
        let shared = Shared::with_shape(2, 2);
        let (psocs, vdevs) = {
            let tree = shared.tree.lock();
            let psocs = tree.psocs.iter().map(|p| p.id).collect();
            let vdevs = tree
                .psocs
                .iter()
                .flat_map(|p| p.vdevs.iter().map(move |v| (p.id, v.id)))
                .collect();
            (psocs, vdevs)
        };
        Fixture { shared, psocs, vdevs }
    }

    fn start(f: &Fixture, path: NodePath) {
        f.shared.tree.lock().node_mut(path).unwrap().trans.start("t").unwrap();
    }

    fn trans(f: &Fixture, path: NodePath) -> Result<(), DscError> {
        can_trans(&f.shared.tree.lock(), path, &f.shared.status)
    }

    fn op(f: &Fixture, path: NodePath) -> Result<(), DscError> {
        can_op(&f.shared.tree.lock(), path)
    }

    #[test]
    fn idle_tree_admits_everything() {
        let f = fixture();
        assert_eq!(trans(&f, NodePath::Driver), Ok(()));
        assert_eq!(op(&f, NodePath::Driver), Ok(()));
        for &(p, v) in &f.vdevs {
            assert_eq!(trans(&f, NodePath::Psoc(p)), Ok(()));
            assert_eq!(trans(&f, NodePath::Vdev(p, v)), Ok(()));
            assert_eq!(op(&f, NodePath::Vdev(p, v)), Ok(()));
        }
    }

    #[test]
    fn driver_transition_rejects_descendants() {
        let f = fixture();
        start(&f, NodePath::Driver);
        assert_eq!(
            trans(&f, NodePath::Driver),
            Err(DscError::Again(Blocker::OwnTransition))
        );
        assert_eq!(op(&f, NodePath::Driver), Err(DscError::Again(Blocker::OwnTransition)));
        for &(p, v) in &f.vdevs {
            let invalid = Err(DscError::Invalid(Rejection::DriverTransition));
            assert_eq!(trans(&f, NodePath::Psoc(p)), invalid);
            assert_eq!(op(&f, NodePath::Psoc(p)), invalid);
            assert_eq!(trans(&f, NodePath::Vdev(p, v)), invalid);
            assert_eq!(op(&f, NodePath::Vdev(p, v)), invalid);
        }
    }

    #[test]
    fn queued_driver_transition_rejects_descendant_transitions_only() {
        let f = fixture();
        start(&f, NodePath::Psoc(f.psocs[0]));
        f.shared.tree.lock().driver.trans.enqueue("waiting");

        let (p, v) = f.vdevs[3];
        assert_eq!(
            trans(&f, NodePath::Vdev(p, v)),
            Err(DscError::Invalid(Rejection::DriverTransition))
        );
        // A queued driver transition does not block operations.
        assert_eq!(op(&f, NodePath::Vdev(p, v)), Ok(()));
        assert_eq!(op(&f, NodePath::Driver), Ok(()));
    }

    #[test]
    fn vdev_transition_defers_psoc_and_driver() {
        let f = fixture();
        let (p, v) = f.vdevs[0];
        start(&f, NodePath::Vdev(p, v));
        assert_eq!(
            trans(&f, NodePath::Psoc(p)),
            Err(DscError::Again(Blocker::DescendantTransition))
        );
        assert_eq!(
            trans(&f, NodePath::Driver),
            Err(DscError::Again(Blocker::DescendantTransition))
        );
        // Ancestor operations are unaffected by a descendant transition.
        assert_eq!(op(&f, NodePath::Psoc(p)), Ok(()));
        assert_eq!(op(&f, NodePath::Driver), Ok(()));
        assert_eq!(op(&f, NodePath::Vdev(p, v)), Err(DscError::Again(Blocker::OwnTransition)));
    }

    #[test]
    fn siblings_are_independent() {
        let f = fixture();
        let (p0, v0) = f.vdevs[0];
        let (_, v1) = f.vdevs[1];
        let (p1, _) = f.vdevs[2];
        start(&f, NodePath::Vdev(p0, v0));
        assert_eq!(trans(&f, NodePath::Vdev(p0, v1)), Ok(()));
        assert_eq!(trans(&f, NodePath::Psoc(p1)), Ok(()));
    }

    #[test]
    fn psoc_transition_blocks_its_vdevs() {
        let f = fixture();
        let (p, v) = f.vdevs[0];
        start(&f, NodePath::Psoc(p));
        assert_eq!(
            trans(&f, NodePath::Vdev(p, v)),
            Err(DscError::Again(Blocker::PsocTransition))
        );
        assert_eq!(
            op(&f, NodePath::Vdev(p, v)),
            Err(DscError::Invalid(Rejection::PsocTransition))
        );
        assert_eq!(op(&f, NodePath::Psoc(p)), Err(DscError::Again(Blocker::OwnTransition)));
    }

    #[test]
    fn unloading_turns_psoc_deferral_into_reject() {
        let f = fixture();
        let (p, v) = f.vdevs[0];
        start(&f, NodePath::Psoc(p));
        f.shared.status.set_unloading(true);
        assert_eq!(
            trans(&f, NodePath::Vdev(p, v)),
            Err(DscError::Invalid(Rejection::PsocTransition))
        );
    }

    #[test]
    fn recovering_rejects_vdev_transitions_only() {
        let f = fixture();
        f.shared.status.set_recovering(true);
        let (p, v) = f.vdevs[0];
        assert_eq!(
            trans(&f, NodePath::Vdev(p, v)),
            Err(DscError::Invalid(Rejection::Recovering))
        );
        assert_eq!(trans(&f, NodePath::Psoc(p)), Ok(()));
        assert_eq!(op(&f, NodePath::Vdev(p, v)), Ok(()));
    }

    #[test]
    fn protection_covers_ancestors() {
        let f = fixture();
        let (p, v) = f.vdevs[0];
        let tree = || f.shared.tree.lock();
        assert!(!is_protected(&tree(), NodePath::Vdev(p, v)));

        start(&f, NodePath::Psoc(p));
        assert!(is_protected(&tree(), NodePath::Psoc(p)));
        assert!(is_protected(&tree(), NodePath::Vdev(p, v)));
        assert!(!is_protected(&tree(), NodePath::Driver));
        assert!(!is_protected(&tree(), NodePath::Psoc(f.psocs[1])));
    }

    #[test]
    fn unknown_node_is_destroyed() {
        let f = fixture();
        let ghost = NodePath::Psoc(PsocId::from_raw(99));
        assert_eq!(trans(&f, ghost), Err(DESTROYED));
        assert_eq!(op(&f, ghost), Err(DESTROYED));
    }
}
