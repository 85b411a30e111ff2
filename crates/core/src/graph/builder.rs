//! Builds workflow graphs for the fixed topology set.
//!
//! Construction is pure: the builder only references the artifact paths it
//! is given and never touches the filesystem. Calling it twice with the
//! same request yields structurally identical graphs.

use serde::{Deserialize, Serialize};

use super::{GraphError, ResourceRequest, TaskEdge, TaskNode, Topology, WorkflowGraph};

/// Memory ceiling for every stage, in MB. Reconstruction peaks well under
/// this on real subjects; sites reject unannotated jobs, so the request
/// stays generous rather than tight.
pub const STAGE_MEMORY_MB: u32 = 4096;

/// Core count for the stages that do not parallelise (initial volume
/// registration and the final surface stage).
const SERIAL_STAGE_CORES: u32 = 1;

/// Tool releases that do not honour per-task resource requests. Nodes
/// built for these versions carry no resource annotations and fall back
/// to site defaults.
const NO_RESOURCE_NEGOTIATION: [&str; 2] = ["5.1.0", "5.3.0-HCP"];

/// Whether a tool version accepts per-task core/memory requests.
pub fn supports_resource_requests(version: &str) -> bool {
    !NO_RESOURCE_NEGOTIATION.contains(&version)
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One uploaded artifact as the builder sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputArtifact {
    /// Absolute path on the shared filesystem.
    pub path: String,
    /// Basename used for artifact wiring inside the graph.
    pub filename: String,
    /// True when this is a pre-structured subject directory rather than a
    /// raw volume file. Mutually exclusive with multi-file raw input.
    pub subject_dir: bool,
}

/// Everything needed to build one job's graph.
#[derive(Debug, Clone)]
pub struct GraphRequest<'a> {
    pub subject: &'a str,
    /// Processing-tool version the job was submitted against.
    pub version: &'a str,
    pub topology: Topology,
    /// Cores for parallelisable stages (2 or 8).
    pub core_tier: u32,
    /// Free-form option string, only meaningful for the custom topology.
    pub options: Option<&'a str>,
    /// Ordered upload artifacts for the job.
    pub inputs: &'a [InputArtifact],
    /// Per-task completion command the backend invokes on task success.
    pub task_hook: Option<&'a str>,
    /// Per-graph completion commands.
    pub on_success: Option<&'a str>,
    pub on_failure: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Build and validate the task graph for `req`.
pub fn build(req: &GraphRequest<'_>) -> Result<WorkflowGraph, GraphError> {
    let nodes_and_edges = match req.topology {
        Topology::Diamond => diamond(req)?,
        Topology::Serial => serial(req)?,
        Topology::Single => single(req)?,
        Topology::Custom => custom(req)?,
    };

    let graph = WorkflowGraph {
        variant: req.topology,
        subject: req.subject.to_string(),
        nodes: nodes_and_edges.0,
        edges: nodes_and_edges.1,
        on_success: req.on_success.map(str::to_string),
        on_failure: req.on_failure.map(str::to_string),
    };
    graph.validate()?;
    Ok(graph)
}

fn diamond(req: &GraphRequest<'_>) -> Result<(Vec<TaskNode>, Vec<TaskEdge>), GraphError> {
    let volume = raw_volume(req)?;
    let nodes = vec![
        initial_node(req, volume),
        hemi_node(req, "lh")?,
        hemi_node(req, "rh")?,
        final_node(req, &[recon2_hemi_output(req.subject, "lh"), recon2_hemi_output(req.subject, "rh")]),
    ];
    let edges = vec![
        edge("autorecon1", "autorecon2-lh"),
        edge("autorecon1", "autorecon2-rh"),
        edge("autorecon2-lh", "autorecon3"),
        edge("autorecon2-rh", "autorecon3"),
    ];
    Ok((nodes, edges))
}

fn serial(req: &GraphRequest<'_>) -> Result<(Vec<TaskNode>, Vec<TaskEdge>), GraphError> {
    let volume = raw_volume(req)?;
    let nodes = vec![
        initial_node(req, volume),
        whole_volume_node(req),
        final_node(req, &[recon2_whole_output(req.subject)]),
    ];
    let edges = vec![
        edge("autorecon1", "autorecon2-whole"),
        edge("autorecon2-whole", "autorecon3"),
    ];
    Ok((nodes, edges))
}

fn single(req: &GraphRequest<'_>) -> Result<(Vec<TaskNode>, Vec<TaskEdge>), GraphError> {
    let volume = raw_volume(req)?;
    let node = TaskNode {
        id: "autorecon-all".to_string(),
        executable: "autorecon-all.sh".to_string(),
        args: vec![
            req.subject.to_string(),
            volume.filename.clone(),
            req.core_tier.to_string(),
        ],
        resources: stage_resources(req, req.core_tier),
        inputs: vec![volume.filename.clone()],
        outputs: vec![terminal_output(req.subject)],
        on_task_done: req.task_hook.map(str::to_string),
    };
    Ok((vec![node], vec![]))
}

fn custom(req: &GraphRequest<'_>) -> Result<(Vec<TaskNode>, Vec<TaskEdge>), GraphError> {
    if req.inputs.is_empty() {
        return Err(GraphError::MissingInput);
    }
    if req.inputs.len() > 1 {
        return Err(GraphError::InvalidInputCombination(
            "custom options require a single subject directory, got multiple artifacts"
                .to_string(),
        ));
    }
    let dir = &req.inputs[0];
    if !dir.subject_dir {
        return Err(GraphError::InvalidInputCombination(
            "custom options require a pre-structured subject directory, got a raw volume"
                .to_string(),
        ));
    }

    let mut args = vec![req.subject.to_string(), dir.path.clone()];
    if let Some(options) = req.options {
        args.push(options.to_string());
    }
    let node = TaskNode {
        id: "autorecon-options".to_string(),
        executable: "autorecon-options.sh".to_string(),
        args,
        resources: stage_resources(req, req.core_tier),
        inputs: vec![dir.filename.clone()],
        outputs: vec![terminal_output(req.subject)],
        on_task_done: req.task_hook.map(str::to_string),
    };
    Ok((vec![node], vec![]))
}

// ---------------------------------------------------------------------------
// Stage nodes
// ---------------------------------------------------------------------------

fn initial_node(req: &GraphRequest<'_>, volume: &InputArtifact) -> TaskNode {
    TaskNode {
        id: "autorecon1".to_string(),
        executable: "autorecon1.sh".to_string(),
        args: vec![
            req.subject.to_string(),
            volume.filename.clone(),
            SERIAL_STAGE_CORES.to_string(),
        ],
        resources: stage_resources(req, SERIAL_STAGE_CORES),
        inputs: vec![volume.filename.clone()],
        outputs: vec![recon1_output(req.subject)],
        on_task_done: req.task_hook.map(str::to_string),
    }
}

fn hemi_node(req: &GraphRequest<'_>, hemisphere: &str) -> Result<TaskNode, GraphError> {
    if hemisphere != "lh" && hemisphere != "rh" {
        return Err(GraphError::InvalidHemisphere(hemisphere.to_string()));
    }
    Ok(TaskNode {
        id: format!("autorecon2-{hemisphere}"),
        executable: "autorecon2.sh".to_string(),
        args: vec![
            req.subject.to_string(),
            hemisphere.to_string(),
            req.core_tier.to_string(),
        ],
        resources: stage_resources(req, req.core_tier),
        inputs: vec![recon1_output(req.subject)],
        outputs: vec![recon2_hemi_output(req.subject, hemisphere)],
        on_task_done: req.task_hook.map(str::to_string),
    })
}

fn whole_volume_node(req: &GraphRequest<'_>) -> TaskNode {
    TaskNode {
        id: "autorecon2-whole".to_string(),
        executable: "autorecon2-whole.sh".to_string(),
        args: vec![req.subject.to_string(), req.core_tier.to_string()],
        resources: stage_resources(req, req.core_tier),
        inputs: vec![recon1_output(req.subject)],
        outputs: vec![recon2_whole_output(req.subject)],
        on_task_done: req.task_hook.map(str::to_string),
    }
}

fn final_node(req: &GraphRequest<'_>, inputs: &[String]) -> TaskNode {
    TaskNode {
        id: "autorecon3".to_string(),
        executable: "autorecon3.sh".to_string(),
        args: vec![req.subject.to_string(), SERIAL_STAGE_CORES.to_string()],
        resources: stage_resources(req, SERIAL_STAGE_CORES),
        inputs: inputs.to_vec(),
        outputs: vec![terminal_output(req.subject)],
        on_task_done: req.task_hook.map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First raw-volume artifact. Pre-structured subject directories only make
/// sense for the custom topology.
fn raw_volume<'a>(req: &'a GraphRequest<'_>) -> Result<&'a InputArtifact, GraphError> {
    let volume = req.inputs.first().ok_or(GraphError::MissingInput)?;
    if volume.subject_dir {
        return Err(GraphError::InvalidInputCombination(
            "subject directory input requires the custom topology".to_string(),
        ));
    }
    if req.options.is_some() {
        return Err(GraphError::InvalidInputCombination(
            "options are only accepted by the custom topology".to_string(),
        ));
    }
    Ok(volume)
}

fn stage_resources(req: &GraphRequest<'_>, cores: u32) -> Option<ResourceRequest> {
    supports_resource_requests(req.version).then_some(ResourceRequest {
        cores,
        memory_mb: STAGE_MEMORY_MB,
    })
}

fn edge(parent: &str, child: &str) -> TaskEdge {
    TaskEdge {
        parent: parent.to_string(),
        child: child.to_string(),
    }
}

fn recon1_output(subject: &str) -> String {
    format!("{subject}_recon1_output.tar.gz")
}

fn recon2_hemi_output(subject: &str, hemisphere: &str) -> String {
    format!("{subject}_recon2_{hemisphere}_output.tar.gz")
}

fn recon2_whole_output(subject: &str) -> String {
    format!("{subject}_recon2_output.tar.gz")
}

fn terminal_output(subject: &str) -> String {
    format!("{subject}_output.tar.bz2")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn volume(name: &str) -> InputArtifact {
        InputArtifact {
            path: format!("/data/fred/input/{name}"),
            filename: name.to_string(),
            subject_dir: false,
        }
    }

    fn subject_dir() -> InputArtifact {
        InputArtifact {
            path: "/data/fred/input/S1_dir".to_string(),
            filename: "S1_dir".to_string(),
            subject_dir: true,
        }
    }

    fn request<'a>(
        topology: Topology,
        inputs: &'a [InputArtifact],
        options: Option<&'a str>,
    ) -> GraphRequest<'a> {
        GraphRequest {
            subject: "S1",
            version: "6.0.1",
            topology,
            core_tier: 8,
            options,
            inputs,
            task_hook: Some("task-completed --id 42"),
            on_success: Some("run-completed --success --id 42"),
            on_failure: Some("run-completed --failure --id 42"),
        }
    }

    #[test]
    fn diamond_has_four_nodes_four_edges() {
        let inputs = [volume("S1_defaced.mgz")];
        let g = build(&request(Topology::Diamond, &inputs, None)).unwrap();
        assert_eq!(g.nodes.len(), 4);
        assert_eq!(g.edges.len(), 4);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn diamond_terminal_depends_on_both_hemispheres() {
        let inputs = [volume("S1_defaced.mgz")];
        let g = build(&request(Topology::Diamond, &inputs, None)).unwrap();
        assert_eq!(g.terminal_node().unwrap().id, "autorecon3");
        let mut deps = g.dependencies_of("autorecon3");
        deps.sort();
        assert_eq!(deps, vec!["autorecon2-lh", "autorecon2-rh"]);
    }

    #[test]
    fn serial_is_a_three_node_chain() {
        let inputs = [volume("S1_defaced.mgz")];
        let g = build(&request(Topology::Serial, &inputs, None)).unwrap();
        assert_eq!(g.nodes.len(), 3);
        assert_eq!(g.edges.len(), 2);
        assert_eq!(g.dependencies_of("autorecon3"), vec!["autorecon2-whole"]);
    }

    #[test]
    fn single_is_one_node_no_edges() {
        let inputs = [volume("S1_defaced.mgz")];
        let g = build(&request(Topology::Single, &inputs, None)).unwrap();
        assert_eq!(g.nodes.len(), 1);
        assert!(g.edges.is_empty());
        assert_eq!(g.terminal_node().unwrap().id, "autorecon-all");
    }

    #[test]
    fn custom_takes_one_subject_dir() {
        let inputs = [subject_dir()];
        let g = build(&request(Topology::Custom, &inputs, Some("-qcache"))).unwrap();
        assert_eq!(g.nodes.len(), 1);
        assert!(g.edges.is_empty());
        let node = g.terminal_node().unwrap();
        assert!(node.args.contains(&"-qcache".to_string()));
    }

    #[test]
    fn custom_rejects_multiple_artifacts() {
        let inputs = [subject_dir(), subject_dir()];
        let err = build(&request(Topology::Custom, &inputs, Some("-qcache"))).unwrap_err();
        assert_matches!(err, GraphError::InvalidInputCombination(_));
    }

    #[test]
    fn custom_rejects_raw_volume() {
        let inputs = [volume("S1_defaced.mgz")];
        let err = build(&request(Topology::Custom, &inputs, Some("-qcache"))).unwrap_err();
        assert_matches!(err, GraphError::InvalidInputCombination(_));
    }

    #[test]
    fn options_rejected_outside_custom() {
        let inputs = [volume("S1_defaced.mgz")];
        let err = build(&request(Topology::Diamond, &inputs, Some("-qcache"))).unwrap_err();
        assert_matches!(err, GraphError::InvalidInputCombination(_));
    }

    #[test]
    fn subject_dir_rejected_outside_custom() {
        let inputs = [subject_dir()];
        let err = build(&request(Topology::Serial, &inputs, None)).unwrap_err();
        assert_matches!(err, GraphError::InvalidInputCombination(_));
    }

    #[test]
    fn empty_inputs_rejected() {
        let err = build(&request(Topology::Diamond, &[], None)).unwrap_err();
        assert_matches!(err, GraphError::MissingInput);
    }

    #[test]
    fn hemi_node_rejects_bad_token() {
        let inputs = [volume("S1_defaced.mgz")];
        let req = request(Topology::Diamond, &inputs, None);
        let err = hemi_node(&req, "mid").unwrap_err();
        assert_matches!(err, GraphError::InvalidHemisphere(token) if token == "mid");
    }

    #[test]
    fn serial_stages_request_one_core() {
        let inputs = [volume("S1_defaced.mgz")];
        let g = build(&request(Topology::Diamond, &inputs, None)).unwrap();
        assert_eq!(g.node("autorecon1").unwrap().resources.as_ref().unwrap().cores, 1);
        assert_eq!(g.node("autorecon3").unwrap().resources.as_ref().unwrap().cores, 1);
        assert_eq!(
            g.node("autorecon2-lh").unwrap().resources.as_ref().unwrap().cores,
            8
        );
    }

    #[test]
    fn legacy_versions_get_no_resource_annotations() {
        let inputs = [volume("S1_defaced.mgz")];
        let mut req = request(Topology::Serial, &inputs, None);
        req.version = "5.1.0";
        let g = build(&req).unwrap();
        assert!(g.nodes.iter().all(|n| n.resources.is_none()));
    }

    #[test]
    fn identical_requests_build_identical_shapes() {
        let inputs = [volume("S1_defaced.mgz")];
        let a = build(&request(Topology::Diamond, &inputs, None)).unwrap();
        let b = build(&request(Topology::Diamond, &inputs, None)).unwrap();
        let ids = |g: &WorkflowGraph| g.nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.edges, b.edges);
    }

    #[test]
    fn every_node_carries_the_task_hook() {
        let inputs = [volume("S1_defaced.mgz")];
        let g = build(&request(Topology::Diamond, &inputs, None)).unwrap();
        assert!(g
            .nodes
            .iter()
            .all(|n| n.on_task_done.as_deref() == Some("task-completed --id 42")));
    }
}
