// crates/dh_config/src/project.rs

//! 项目描述模型
//!
//! 以 serde 模型描述一个排水系统项目：雨量计、子汇水区、节点、
//! 管段、污染物与土地利用。所有数值使用用户单位，构建引擎对象时
//! 统一换算为内部单位。
//!
//! 文本输入文件的解析不在本引擎范围内；项目描述由上游工具以
//! JSON 形式提供。

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::options::SimOptions;

/// 完整项目描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// 项目标题
    #[serde(default)]
    pub title: Option<String>,

    /// 模拟选项
    pub options: SimOptions,

    /// 雨量计
    #[serde(default)]
    pub gages: Vec<GageConfig>,

    /// 子汇水区
    #[serde(default)]
    pub subcatchments: Vec<SubcatchConfig>,

    /// 节点
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// 管段
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// 污染物
    #[serde(default)]
    pub pollutants: Vec<PollutantConfig>,

    /// 土地利用
    #[serde(default)]
    pub land_uses: Vec<LandUseConfig>,
}

impl ProjectConfig {
    /// 从 JSON 字符串解析
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: ProjectConfig = serde_json::from_str(text)?;
        cfg.options.validate()?;
        cfg.validate_references()?;
        Ok(cfg)
    }

    /// 从文件加载
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// 按名称查找节点下标
    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// 按名称查找子汇水区下标
    pub fn find_subcatch(&self, name: &str) -> Option<usize> {
        self.subcatchments.iter().position(|s| s.name == name)
    }

    /// 按名称查找雨量计下标
    pub fn find_gage(&self, name: &str) -> Option<usize> {
        self.gages.iter().position(|g| g.name == name)
    }

    /// 按名称查找管段下标
    pub fn find_link(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|l| l.name == name)
    }

    /// 校验名称引用的完整性
    fn validate_references(&self) -> Result<(), ConfigError> {
        for sc in &self.subcatchments {
            if let Some(gage) = &sc.gage {
                if self.find_gage(gage).is_none() {
                    return Err(ConfigError::UnknownReference {
                        kind: "雨量计",
                        name: gage.clone(),
                    });
                }
            }
            match &sc.outlet {
                OutletRef::Node(name) => {
                    if self.find_node(name).is_none() {
                        return Err(ConfigError::UnknownReference {
                            kind: "节点",
                            name: name.clone(),
                        });
                    }
                }
                OutletRef::Subcatchment(name) => {
                    if self.find_subcatch(name).is_none() {
                        return Err(ConfigError::UnknownReference {
                            kind: "子汇水区",
                            name: name.clone(),
                        });
                    }
                }
            }
        }
        for link in &self.links {
            for node in [&link.from, &link.to] {
                if self.find_node(node).is_none() {
                    return Err(ConfigError::UnknownReference {
                        kind: "节点",
                        name: node.clone(),
                    });
                }
            }
        }
        for node in &self.nodes {
            if let NodeKindConfig::Outfall {
                route_to: Some(name),
            } = &node.kind
            {
                if self.find_subcatch(name).is_none() {
                    return Err(ConfigError::UnknownReference {
                        kind: "子汇水区",
                        name: name.clone(),
                    });
                }
            }
            if let NodeKindConfig::Divider { diversion_link, .. } = &node.kind {
                if self.find_link(diversion_link).is_none() {
                    return Err(ConfigError::UnknownReference {
                        kind: "管段",
                        name: diversion_link.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ============================================================
// 雨量计
// ============================================================

/// 雨量计配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GageConfig {
    /// 名称
    pub name: String,
    /// 降雨时间序列：（起始偏移 [h]，强度 [in/hr 或 mm/hr]）
    pub series: Vec<(f64, f64)>,
    /// 序列记录间隔 [h]
    #[serde(default = "default_rain_interval")]
    pub interval: f64,
}

fn default_rain_interval() -> f64 {
    1.0
}

// ============================================================
// 子汇水区
// ============================================================

/// 子汇水区出口
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutletRef {
    /// 排入节点
    Node(String),
    /// 排入另一子汇水区
    Subcatchment(String),
}

/// 子面积间的内部汇流去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubareaRouting {
    /// 全部直接排向出口
    #[default]
    Outlet,
    /// 透水面径流转入不透水面
    Imperv,
    /// 不透水面径流转入透水面
    Perv,
}

/// 入渗模型参数
///
/// 霍顿 / Green-Ampt / 径流曲线数等完整模型属于外部协作者；
/// 此处仅内置常容量模型以支撑测试与演示。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfilConfig {
    /// 恒定入渗容量 [in/hr 或 mm/hr]
    Constant {
        /// 入渗容量
        capacity: f64,
    },
    /// 不入渗
    None,
}

impl Default for InfilConfig {
    fn default() -> Self {
        InfilConfig::None
    }
}

/// 地下水联动参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundwaterConfig {
    /// 含水层底板高程 [ft 或 m]
    pub bottom_elev: f64,
    /// 初始地下水位高程 [ft 或 m]
    pub water_table: f64,
    /// 初始非饱和带含水率
    #[serde(default)]
    pub theta: f64,
    /// 非饱和带最大可容纳入渗体积速率 [in/hr 或 mm/hr]
    #[serde(default)]
    pub max_infil_rate: f64,
}

/// 子汇水区配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcatchConfig {
    /// 名称
    pub name: String,
    /// 雨量计
    #[serde(default)]
    pub gage: Option<String>,
    /// 出口
    pub outlet: OutletRef,
    /// 面积 [acre 或 ha]
    pub area: f64,
    /// 不透水比例 [%]
    pub pct_imperv: f64,
    /// 特征宽度 [ft 或 m]
    pub width: f64,
    /// 平均坡度 [%]
    pub slope: f64,
    /// 路缘长度
    #[serde(default)]
    pub curb_length: f64,
    /// 不透水面曼宁 n
    #[serde(default = "default_n_imperv")]
    pub n_imperv: f64,
    /// 透水面曼宁 n
    #[serde(default = "default_n_perv")]
    pub n_perv: f64,
    /// 不透水面洼蓄深 [in 或 mm]
    #[serde(default = "default_dstore_imperv")]
    pub dstore_imperv: f64,
    /// 透水面洼蓄深 [in 或 mm]
    #[serde(default = "default_dstore_perv")]
    pub dstore_perv: f64,
    /// 无洼蓄不透水面占不透水面的比例 [%]
    #[serde(default = "default_pct_zero")]
    pub pct_zero: f64,
    /// 子面积间汇流去向
    #[serde(default)]
    pub route_to: SubareaRouting,
    /// 参与内部汇流的径流比例 [%]
    #[serde(default = "default_pct_routed")]
    pub pct_routed: f64,
    /// LID 占地面积 [acre 或 ha]
    #[serde(default)]
    pub lid_area: f64,
    /// 入渗模型
    #[serde(default)]
    pub infiltration: InfilConfig,
    /// 地下水联动
    #[serde(default)]
    pub groundwater: Option<GroundwaterConfig>,
    /// 是否附着积雪对象
    #[serde(default)]
    pub snowpack: bool,
    /// 写入结果文件
    #[serde(default = "default_report")]
    pub report: bool,
}

fn default_n_imperv() -> f64 {
    0.013
}
fn default_n_perv() -> f64 {
    0.1
}
fn default_dstore_imperv() -> f64 {
    0.05
}
fn default_dstore_perv() -> f64 {
    0.05
}
fn default_pct_zero() -> f64 {
    25.0
}
fn default_pct_routed() -> f64 {
    100.0
}
fn default_report() -> bool {
    true
}

// ============================================================
// 节点
// ============================================================

/// 分流器子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividerKind {
    /// 超过截流量的部分被分走
    Cutoff,
    /// 低于截流量的部分被分走
    Overflow,
}

/// 调蓄曲线：A = a·dᵇ + c，或逐点表格
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageCurveConfig {
    /// 函数型面积曲线
    Functional {
        /// 系数 a
        coeff: f64,
        /// 指数 b
        exponent: f64,
        /// 常数 c
        constant: f64,
    },
    /// 表格型面积曲线：（水深，表面积）
    Tabular {
        /// 曲线点
        points: Vec<(f64, f64)>,
    },
}

/// 节点类型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NodeKindConfig {
    /// 检查井 / 汇合节点
    Junction,
    /// 排放口
    Outfall {
        /// 排放流量回灌到的子汇水区
        #[serde(default)]
        route_to: Option<String>,
    },
    /// 分流器
    Divider {
        /// 分流管段
        diversion_link: String,
        /// 子类型
        kind: DividerKind,
        /// 截流流量 [用户流量单位]
        q_min: f64,
    },
    /// 调蓄节点
    Storage {
        /// 调蓄曲线
        curve: StorageCurveConfig,
    },
}

/// 节点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// 名称
    pub name: String,
    /// 类型
    #[serde(flatten)]
    pub kind: NodeKindConfig,
    /// 井底高程 [ft 或 m]
    pub invert_elev: f64,
    /// 最大水深 [ft 或 m]
    #[serde(default)]
    pub max_depth: f64,
    /// 非调蓄节点的等效表面积 [ft² 或 m²]（缺省为 4 ft 井筒）
    #[serde(default = "default_node_area")]
    pub area: f64,
    /// 初始水深 [ft 或 m]
    #[serde(default)]
    pub init_depth: f64,
    /// 积水面积 [ft² 或 m²]
    #[serde(default)]
    pub ponded_area: f64,
    /// 写入结果文件
    #[serde(default = "default_report")]
    pub report: bool,
}

// ============================================================
// 管段
// ============================================================

/// 断面配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum XsectConfig {
    /// 虚拟断面（无水力属性）
    Dummy,
    /// 圆形
    Circular {
        /// 直径 [ft 或 m]
        diameter: f64,
    },
    /// 封闭矩形
    RectClosed {
        /// 宽 [ft 或 m]
        width: f64,
        /// 高 [ft 或 m]
        height: f64,
    },
    /// 开放矩形
    RectOpen {
        /// 宽 [ft 或 m]
        width: f64,
        /// 高 [ft 或 m]
        height: f64,
    },
    /// 梯形
    Trapezoidal {
        /// 底宽 [ft 或 m]
        base_width: f64,
        /// 高 [ft 或 m]
        height: f64,
        /// 边坡（水平/垂直）
        side_slope: f64,
    },
}

/// 管段类型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum LinkKindConfig {
    /// 管道 / 渠道
    Conduit {
        /// 长度 [ft 或 m]
        length: f64,
        /// 曼宁糙率
        roughness: f64,
        /// 并联孔数
        #[serde(default = "default_barrels")]
        barrels: u32,
        /// 断面
        xsect: XsectConfig,
        /// 蒸发损失速率 [cfs 或 cms]
        #[serde(default)]
        evap_loss_rate: f64,
        /// 渗漏损失速率 [cfs 或 cms]
        #[serde(default)]
        seep_loss_rate: f64,
    },
    /// 理想泵
    Pump,
    /// 孔口：Q = setting·coeff·√h
    Orifice {
        /// 流量系数（已并入孔口面积与 √2g）
        coeff: f64,
    },
    /// 堰：Q = coeff·h^1.5
    Weir {
        /// 流量系数（已并入堰宽）
        coeff: f64,
    },
    /// 出流口：Q = coeff·h^exponent
    Outlet {
        /// 流量系数
        coeff: f64,
        /// 水头指数
        #[serde(default = "default_outlet_exponent")]
        exponent: f64,
    },
}

fn default_outlet_exponent() -> f64 {
    1.0
}

fn default_node_area() -> f64 {
    12.566
}

fn default_barrels() -> u32 {
    1
}

/// 管段配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// 名称
    pub name: String,
    /// 上游节点
    pub from: String,
    /// 下游节点
    pub to: String,
    /// 类型
    #[serde(flatten)]
    pub kind: LinkKindConfig,
    /// 上游偏移 [ft 或 m]
    #[serde(default)]
    pub offset1: f64,
    /// 下游偏移 [ft 或 m]
    #[serde(default)]
    pub offset2: f64,
    /// 初始流量 [用户流量单位]
    #[serde(default)]
    pub init_flow: f64,
    /// 写入结果文件
    #[serde(default = "default_report")]
    pub report: bool,
}

// ============================================================
// 污染物与土地利用
// ============================================================

/// 污染物浓度单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcUnits {
    /// 毫克每升
    #[default]
    MgPerL,
    /// 微克每升
    UgPerL,
    /// 计数每升
    CountPerL,
}

impl ConcUnits {
    /// 二进制文件中的单位代码
    pub fn code(self) -> i32 {
        match self {
            ConcUnits::MgPerL => 0,
            ConcUnits::UgPerL => 1,
            ConcUnits::CountPerL => 2,
        }
    }
}

/// 污染物配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollutantConfig {
    /// 名称
    pub name: String,
    /// 浓度单位
    #[serde(default)]
    pub units: ConcUnits,
}

/// 土地利用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandUseConfig {
    /// 名称
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        serde_json::json!({
            "options": {
                "start_date": "2023-06-01T00:00:00",
                "end_date": "2023-06-01T06:00:00"
            },
            "gages": [
                {"name": "G1", "series": [[0.0, 0.5]], "interval": 6.0}
            ],
            "subcatchments": [
                {
                    "name": "S1", "gage": "G1",
                    "outlet": {"node": "O1"},
                    "area": 1.0, "pct_imperv": 100.0,
                    "width": 100.0, "slope": 1.0
                }
            ],
            "nodes": [
                {"name": "O1", "type": "outfall", "invert_elev": 0.0}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_parse_minimal_project() {
        let cfg = ProjectConfig::from_json(&minimal_json()).unwrap();
        assert_eq!(cfg.gages.len(), 1);
        assert_eq!(cfg.subcatchments.len(), 1);
        assert_eq!(cfg.nodes.len(), 1);
        assert!(matches!(
            cfg.nodes[0].kind,
            NodeKindConfig::Outfall { route_to: None }
        ));
        // 子面积参数落到缺省值
        let sc = &cfg.subcatchments[0];
        assert!((sc.n_imperv - 0.013).abs() < 1e-12);
        assert!((sc.pct_zero - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_gage_rejected() {
        let text = minimal_json().replace("\"gage\":\"G1\"", "\"gage\":\"G9\"");
        assert!(ProjectConfig::from_json(&text).is_err());
    }

    #[test]
    fn test_unknown_outlet_rejected() {
        let text = minimal_json().replace("{\"node\":\"O1\"}", "{\"node\":\"O9\"}");
        assert!(ProjectConfig::from_json(&text).is_err());
    }

    #[test]
    fn test_link_kind_tagged_parse() {
        let link: LinkConfig = serde_json::from_value(serde_json::json!({
            "name": "C1", "from": "J1", "to": "O1",
            "type": "conduit", "length": 400.0, "roughness": 0.013,
            "xsect": {"shape": "circular", "diameter": 1.0}
        }))
        .unwrap();
        match link.kind {
            LinkKindConfig::Conduit {
                length, barrels, ..
            } => {
                assert!((length - 400.0).abs() < 1e-12);
                assert_eq!(barrels, 1);
            }
            _ => panic!("应解析为管道"),
        }
    }

    #[test]
    fn test_storage_node_parse() {
        let node: NodeConfig = serde_json::from_value(serde_json::json!({
            "name": "T1", "type": "storage", "invert_elev": 0.0,
            "max_depth": 10.0,
            "curve": {"functional": {"coeff": 0.0, "exponent": 0.0, "constant": 500.0}}
        }))
        .unwrap();
        assert!(matches!(node.kind, NodeKindConfig::Storage { .. }));
    }
}
