//! Static kubectl vocabulary: verbs, resource kinds with aliases, and subcommands.

use crate::prompt::Suggestion;

#[derive(Debug)]
pub struct ResourceKind {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub namespaced: bool,
}

const fn kind(
    name: &'static str,
    aliases: &'static [&'static str],
    namespaced: bool,
) -> ResourceKind {
    ResourceKind {
        name,
        aliases,
        namespaced,
    }
}

pub static RESOURCE_KINDS: &[ResourceKind] = &[
    kind("componentstatuses", &["cs", "componentstatus"], false),
    kind("configmaps", &["cm", "configmap"], true),
    kind("cronjobs", &["cj", "cronjob"], true),
    kind("daemonsets", &["ds", "daemonset"], true),
    kind("deployments", &["deploy", "deployment"], true),
    kind("endpoints", &["ep"], true),
    kind("events", &["ev", "event"], true),
    kind("horizontalpodautoscalers", &["hpa"], true),
    kind("ingresses", &["ing", "ingress"], true),
    kind("jobs", &["job"], true),
    kind("limitranges", &["limits"], true),
    kind("namespaces", &["ns", "namespace"], false),
    kind("networkpolicies", &["netpol"], true),
    kind("nodes", &["no", "node"], false),
    kind("persistentvolumeclaims", &["pvc"], true),
    kind("persistentvolumes", &["pv"], false),
    kind("pods", &["po", "pod"], true),
    kind("podtemplates", &[], true),
    kind("replicasets", &["rs", "replicaset"], true),
    kind("replicationcontrollers", &["rc"], true),
    kind("resourcequotas", &["quota"], true),
    kind("secrets", &["secret"], true),
    kind("serviceaccounts", &["sa", "serviceaccount"], true),
    kind("services", &["svc", "service"], true),
    kind("statefulsets", &["sts", "statefulset"], true),
    kind("storageclasses", &["sc", "storageclass"], false),
];

/// Resolve a kind by plural name or alias.
pub fn lookup_kind(name: &str) -> Option<&'static ResourceKind> {
    let name = name.to_ascii_lowercase();
    RESOURCE_KINDS
        .iter()
        .find(|kind| kind.name == name || kind.aliases.contains(&name.as_str()))
}

/// Plural kind names first, then the short aliases (described by their kind).
pub fn resource_type_suggestions() -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = RESOURCE_KINDS
        .iter()
        .map(|kind| Suggestion::new(kind.name, ""))
        .collect();
    for kind in RESOURCE_KINDS {
        if let Some(short) = kind.aliases.first() {
            suggestions.push(Suggestion::new(*short, kind.name));
        }
    }
    suggestions
}

fn table(entries: &[(&str, &str)]) -> Vec<Suggestion> {
    entries
        .iter()
        .map(|(text, description)| Suggestion::new(*text, *description))
        .collect()
}

pub fn verb_suggestions() -> Vec<Suggestion> {
    table(&[
        ("get", "Display one or many resources"),
        ("describe", "Show details of a specific resource or group of resources"),
        ("create", "Create a resource by filename or stdin"),
        ("replace", "Replace a resource by filename or stdin."),
        ("patch", "Update field(s) of a resource using strategic merge patch."),
        ("delete", "Delete resources by filenames, stdin, resources and names, or by resources and label selector."),
        ("edit", "Edit a resource on the server"),
        ("apply", "Apply a configuration to a resource by filename or stdin"),
        ("logs", "Print the logs for a container in a pod."),
        ("scale", "Set a new size for a Deployment, ReplicaSet, Replication Controller, or Job."),
        ("cordon", "Mark node as unschedulable"),
        ("drain", "Drain node in preparation for maintenance"),
        ("uncordon", "Mark node as schedulable"),
        ("attach", "Attach to a running container."),
        ("exec", "Execute a command in a container."),
        ("port-forward", "Forward one or more local ports to a pod."),
        ("proxy", "Run a proxy to the Kubernetes API server"),
        ("run", "Run a particular image on the cluster."),
        ("expose", "Take a replication controller, service, or pod and expose it as a new Kubernetes Service"),
        ("autoscale", "Auto-scale a Deployment, ReplicaSet, or ReplicationController"),
        ("rollout", "rollout manages a deployment"),
        ("label", "Update the labels on a resource"),
        ("annotate", "Update the annotations on a resource"),
        ("config", "config modifies kubeconfig files"),
        ("cluster-info", "Display cluster info"),
        ("api-resources", "Print the supported API resources on the server"),
        ("api-versions", "Print the supported API versions on the server, in the form of \"group/version\"."),
        ("version", "Print the client and server version information."),
        ("explain", "Documentation of resources."),
        ("convert", "Convert config files between different API versions"),
        ("top", "Display Resource (CPU/Memory/Storage) usage"),
        ("clear", "Clear the screen"),
        ("exit", "Exit this program"),
    ])
}

/// Fixed second-token vocabulary for verbs that take a subcommand.
pub fn subcommands(verb: &str) -> Option<Vec<Suggestion>> {
    let entries: &[(&str, &str)] = match verb {
        "create" => &[
            ("configmap", "Create a configmap from a local file, directory or literal value"),
            ("deployment", "Create a deployment with the specified name."),
            ("job", "Create a job with the specified name."),
            ("namespace", "Create a namespace with the specified name"),
            ("quota", "Create a quota with the specified name."),
            ("secret", "Create a secret using specified subcommand"),
            ("service", "Create a service using specified subcommand."),
            ("serviceaccount", "Create a service account with the specified name"),
        ],
        "config" => &[
            ("current-context", "Displays the current-context"),
            ("get-clusters", "Display clusters defined in the kubeconfig"),
            ("get-contexts", "Describe one or many contexts"),
            ("use-context", "Sets the current-context in a kubeconfig file"),
            ("view", "Display merged kubeconfig settings or a specified kubeconfig file"),
        ],
        "rollout" => &[
            ("history", "View rollout history"),
            ("pause", "Mark the provided resource as paused"),
            ("restart", "Restart a resource"),
            ("resume", "Resume a paused resource"),
            ("status", "Show the status of the rollout"),
            ("undo", "Undo a previous rollout"),
        ],
        "top" => &[
            ("nodes", "Display Resource (CPU/Memory/Storage) usage of nodes"),
            ("pods", "Display Resource (CPU/Memory/Storage) usage of pods"),
        ],
        "cluster-info" => &[("dump", "Dump lots of relevant info for debugging and diagnosis")],
        _ => return None,
    };
    Some(table(entries))
}

/// Kinds accepted as the second token of verbs that only operate on a few kinds.
pub fn kinds_for(verb: &str) -> Option<&'static [&'static str]> {
    match verb {
        "scale" => Some(&["deployments", "replicasets", "replicationcontrollers", "statefulsets"]),
        "autoscale" => Some(&["deployments", "replicasets", "replicationcontrollers", "statefulsets"]),
        "expose" => Some(&["deployments", "pods", "replicasets", "replicationcontrollers", "services"]),
        "rollout" => Some(&["daemonsets", "deployments", "statefulsets"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_kinds() {
        assert_eq!(lookup_kind("po").map(|k| k.name), Some("pods"));
        assert_eq!(lookup_kind("Deploy").map(|k| k.name), Some("deployments"));
        assert_eq!(lookup_kind("ns").map(|k| k.namespaced), Some(false));
        assert!(lookup_kind("widgets").is_none());
    }

    #[test]
    fn resource_types_list_kinds_before_aliases() {
        let types = resource_type_suggestions();
        let pods = types.iter().position(|s| s.text == "pods").unwrap();
        let po = types.iter().position(|s| s.text == "po").unwrap();
        assert!(pods < po);
        assert_eq!(types[po].description, "pods");
    }

    #[test]
    fn subcommands_only_for_nested_verbs() {
        assert!(subcommands("config")
            .unwrap()
            .iter()
            .any(|s| s.text == "use-context"));
        assert!(subcommands("get").is_none());
    }
}
