// crates/dh_physics/src/routing/toposort.rs

//! 管段拓扑排序
//!
//! Kahn 算法：按节点入度剥离，节点出队时一次性输出其全部出流
//! 管段。同一节点的出流管段在结果中连续出现，调蓄迭代依赖这一
//! 性质从当前位置向后扫描同源管段。
//!
//! 树状布局校验已排除环路；含环的一般布局只在动力波模型下出现，
//! 其遍历顺序由动力波求解器自行决定。

use crate::project::Project;

/// 返回拓扑序下的管段下标
pub fn toposort_links(prj: &Project) -> Vec<usize> {
    let n_nodes = prj.nodes.len();
    let n_links = prj.links.len();

    // 各节点的出流管段与入度（按校正后的流向）
    let mut out_links: Vec<Vec<usize>> = vec![Vec::new(); n_nodes];
    let mut indegree = vec![0usize; n_nodes];
    for (j, link) in prj.links.iter().enumerate() {
        let (up, down) = if link.direction >= 0 {
            (link.node1, link.node2)
        } else {
            (link.node2, link.node1)
        };
        out_links[up].push(j);
        indegree[down] += 1;
    }

    let mut queue: Vec<usize> = (0..n_nodes).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n_links);

    while let Some(node) = queue.pop() {
        for &j in &out_links[node] {
            order.push(j);
            let link = &prj.links[j];
            let down = if link.direction >= 0 {
                link.node2
            } else {
                link.node1
            };
            indegree[down] -= 1;
            if indegree[down] == 0 {
                queue.push(down);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use dh_config::ProjectConfig;

    fn chain_project() -> Project {
        // J1 → C1 → J2 → C2 → O1，再加一条支线 J3 → C3 → J2
        let cfg = ProjectConfig::from_json(
            &serde_json::json!({
                "options": {
                    "start_date": "2023-06-01T00:00:00",
                    "end_date": "2023-06-01T06:00:00"
                },
                "nodes": [
                    {"name": "J1", "type": "junction", "invert_elev": 110.0, "max_depth": 4.0},
                    {"name": "J2", "type": "junction", "invert_elev": 105.0, "max_depth": 4.0},
                    {"name": "J3", "type": "junction", "invert_elev": 112.0, "max_depth": 4.0},
                    {"name": "O1", "type": "outfall", "invert_elev": 100.0}
                ],
                "links": [
                    {"name": "C2", "from": "J2", "to": "O1", "type": "conduit",
                     "length": 500.0, "roughness": 0.013,
                     "xsect": {"shape": "circular", "diameter": 1.5}},
                    {"name": "C1", "from": "J1", "to": "J2", "type": "conduit",
                     "length": 500.0, "roughness": 0.013,
                     "xsect": {"shape": "circular", "diameter": 1.0}},
                    {"name": "C3", "from": "J3", "to": "J2", "type": "conduit",
                     "length": 500.0, "roughness": 0.013,
                     "xsect": {"shape": "circular", "diameter": 1.0}}
                ]
            })
            .to_string(),
        )
        .unwrap();
        Project::from_config(&cfg).unwrap()
    }

    #[test]
    fn test_toposort_covers_all_links() {
        let prj = chain_project();
        let order = toposort_links(&prj);
        assert_eq!(order.len(), 3);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn test_upstream_links_precede_downstream() {
        let prj = chain_project();
        let order = toposort_links(&prj);
        let pos = |name: &str| {
            let idx = prj.links.iter().position(|l| l.name == name).unwrap();
            order.iter().position(|&j| j == idx).unwrap()
        };
        // C1、C3 都必须在 C2 之前
        assert!(pos("C1") < pos("C2"));
        assert!(pos("C3") < pos("C2"));
    }
}
