// crates/dh_physics/src/project.rs

//! 项目上下文
//!
//! 持有全部对象目录、模拟时钟、单位换算器与质量平衡账本，
//! 以 `&mut` 贯穿每一次引擎调用。引擎不保留任何隐藏的静态
//! 状态（只读常量除外）。
//!
//! # 粘性错误
//!
//! `error_code` 一经置位即保持；每个核心操作在入口检查并
//! 短路，关闭路径仍会冲刷热启动与结果文件。告警只累加计数。

use chrono::{Duration, NaiveDate, NaiveDateTime};

use dh_config::{
    FileMode, InfilConfig, LinkKindConfig, NodeKindConfig, OutletRef, ProjectConfig,
    RoutingModel, StorageCurveConfig, SubareaRouting, XsectConfig,
};
use dh_foundation::consts::TINY;
use dh_foundation::units::{Quantity, Units};

use crate::couplers::{GroundwaterState, InfilModel, InfilState, LidState, SnowpackState};
use crate::error::{EngineError, EngineResult, ErrorCode};
use crate::forcing::{Climate, Gage};
use crate::massbal::MassBalance;
use crate::objects::link::{Conduit, FullState, Link, LinkKind};
use crate::objects::node::{
    Divider, DividerKind, Node, NodeKind, Outfall, Storage, StorageCurve,
};
use crate::objects::subcatch::{
    LandFactor, RouteTo, Subcatchment, IMPERV0, IMPERV1, PERV,
};
use crate::objects::xsect::Xsect;
use crate::objects::{LandUse, Pollutant};

/// 结果文件的日期纪元：1899-12-30
fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// 模拟时钟 [ms]
///
/// 产流与演算各自维护一对新旧时刻，报告时刻在两者之间插值。
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    /// 上一产流时刻
    pub old_runoff_time: f64,
    /// 当前产流时刻
    pub new_runoff_time: f64,
    /// 上一演算时刻
    pub old_routing_time: f64,
    /// 当前演算时刻
    pub new_routing_time: f64,
}

/// 产流引擎的跨步标志
#[derive(Debug, Clone, Copy, Default)]
pub struct RunoffFlags {
    /// 任一雨量计正在降雨
    pub is_raining: bool,
    /// 任一子汇水区仍有径流
    pub has_runoff: bool,
    /// 任一积雪面仍有积雪
    pub has_snow: bool,
    /// 任一 LID 处于湿润状态
    pub has_wet_lids: bool,
    /// 已执行的产流步数
    pub nsteps: u32,
}

/// 接口文件角色（内部表示）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfaceMode {
    /// 不使用
    #[default]
    None,
    /// 读取替代计算
    Use,
    /// 计算并保存
    Save,
}

/// 项目上下文
#[derive(Debug)]
pub struct Project {
    /// 项目标题
    pub title: Option<String>,
    /// 单位换算器
    pub units: Units,
    /// 流量演算模型
    pub routing_model: RoutingModel,

    /// 降雨期产流步长 [s]
    pub wet_step: f64,
    /// 无雨期产流步长 [s]
    pub dry_step: f64,
    /// 管网演算步长 [s]
    pub routing_step: f64,
    /// 报告步长 [s]
    pub report_step: f64,
    /// 模拟起始时刻
    pub start_date: NaiveDateTime,
    /// 报告起始时刻 [ms]
    pub report_start_ms: f64,
    /// 模拟总时长 [ms]
    pub total_duration_ms: f64,

    /// 允许节点积水
    pub allow_ponding: bool,
    /// 忽略融雪
    pub ignore_snowmelt: bool,
    /// 忽略地下水
    pub ignore_gwater: bool,
    /// 忽略水质
    pub ignore_quality: bool,
    /// 忽略管网演算
    pub ignore_routing: bool,

    /// 产流接口文件模式
    pub runoff_iface_mode: IfaceMode,

    /// 雨量计目录
    pub gages: Vec<Gage>,
    /// 子汇水区目录
    pub subcatchments: Vec<Subcatchment>,
    /// 节点目录
    pub nodes: Vec<Node>,
    /// 管段目录
    pub links: Vec<Link>,
    /// 污染物目录
    pub pollutants: Vec<Pollutant>,
    /// 土地利用目录
    pub land_uses: Vec<LandUse>,

    /// 气候状态
    pub climate: Climate,
    /// 质量平衡账本
    pub massbal: MassBalance,
    /// 模拟时钟
    pub clock: Clock,
    /// 产流跨步标志
    pub runoff_flags: RunoffFlags,

    /// 粘性错误码
    pub error_code: Option<ErrorCode>,
    /// 告警计数
    pub warning_count: u32,
}

impl Project {
    /// 从项目描述构建
    ///
    /// 所有数值从用户单位换算为内部单位，名称引用解析为目录
    /// 下标，并完成静态校验（子面积 α、管道坡度、出流度数）。
    pub fn from_config(cfg: &ProjectConfig) -> EngineResult<Self> {
        cfg.options.validate().map_err(EngineError::Config)?;
        let units = Units::new(cfg.options.flow_units);

        let ucf_len = units.ucf(Quantity::Length);
        let ucf_area = units.ucf(Quantity::LandArea);
        let ucf_rain = units.ucf(Quantity::Rainfall);
        let ucf_depth = units.ucf(Quantity::RainDepth);
        let ucf_evap = units.ucf(Quantity::EvapRate);
        let ucf_flow = units.ucf(Quantity::Flow);
        // 小面积（节点表面积/积水面积）按长度因子的平方换算
        let ucf_sq = ucf_len * ucf_len;

        let n_pollut = cfg.pollutants.len();
        let n_landuse = cfg.land_uses.len();

        // ---- 雨量计 ----
        let gages: Vec<Gage> = cfg
            .gages
            .iter()
            .map(|g| {
                let series = g
                    .series
                    .iter()
                    .map(|&(h, x)| (h * 3_600_000.0, x / ucf_rain))
                    .collect();
                Gage::new(g.name.clone(), series, g.interval * 3_600_000.0)
            })
            .collect();

        // ---- 子汇水区 ----
        let mut subcatchments = Vec::with_capacity(cfg.subcatchments.len());
        for sc in &cfg.subcatchments {
            let gage = sc.gage.as_deref().and_then(|n| cfg.find_gage(n));
            let (out_node, out_subcatch) = match &sc.outlet {
                OutletRef::Node(n) => (cfg.find_node(n), None),
                OutletRef::Subcatchment(n) => (None, cfg.find_subcatch(n)),
            };
            let area = sc.area / ucf_area;
            let lid_area = sc.lid_area / ucf_area;
            // 不透水比例封顶 100%
            let frac_imperv = (sc.pct_imperv.min(100.0) / 100.0).max(0.0);
            let pct_zero = sc.pct_zero / 100.0;
            let f_outlet_kept = 1.0 - sc.pct_routed / 100.0;

            let mut sub = Subcatchment {
                name: sc.name.clone(),
                gage,
                out_node,
                out_subcatch,
                area,
                frac_imperv,
                width: sc.width / ucf_len,
                slope: sc.slope / 100.0,
                curb_length: sc.curb_length,
                lid_area,
                subareas: Default::default(),
                rpt_flag: sc.report,
                rainfall: 0.0,
                old_runoff: 0.0,
                new_runoff: 0.0,
                old_snow_depth: 0.0,
                new_snow_depth: 0.0,
                runon: 0.0,
                evap_loss: 0.0,
                infil_loss: 0.0,
                old_qual: vec![0.0; n_pollut],
                new_qual: vec![0.0; n_pollut],
                ponded_qual: vec![0.0; n_pollut],
                land_factors: vec![
                    LandFactor {
                        fraction: 0.0,
                        buildup: vec![0.0; n_pollut],
                        last_swept: 0.0,
                    };
                    n_landuse
                ],
                infil: InfilState::new(match &sc.infiltration {
                    InfilConfig::None => InfilModel::None,
                    InfilConfig::Constant { capacity } => InfilModel::Constant {
                        capacity: capacity / ucf_rain,
                    },
                }),
                groundwater: sc.groundwater.as_ref().map(|gw| {
                    GroundwaterState::new(
                        gw.bottom_elev / ucf_len,
                        gw.water_table / ucf_len,
                        gw.theta,
                        gw.max_infil_rate / ucf_rain,
                    )
                }),
                snowpack: if sc.snowpack {
                    Some(SnowpackState::new(3.0e-8))
                } else {
                    None
                },
                lid: if lid_area > 0.0 {
                    Some(LidState::new(lid_area))
                } else {
                    None
                },
            };

            // 子面积参数：两类不透水面共用同一曼宁 n
            sub.subareas[IMPERV0].n = sc.n_imperv;
            sub.subareas[IMPERV1].n = sc.n_imperv;
            sub.subareas[PERV].n = sc.n_perv;
            sub.subareas[IMPERV0].dstore = 0.0;
            sub.subareas[IMPERV1].dstore = sc.dstore_imperv / ucf_depth;
            sub.subareas[PERV].dstore = sc.dstore_perv / ucf_depth;
            sub.subareas[IMPERV0].f_area = frac_imperv * pct_zero;
            sub.subareas[IMPERV1].f_area = frac_imperv * (1.0 - pct_zero);
            sub.subareas[PERV].f_area = 1.0 - frac_imperv;
            for sa in &mut sub.subareas {
                sa.route_to = RouteTo::Outlet;
                sa.f_outlet = 1.0;
            }
            // 全透水或全不透水时内部汇流退化为直排
            let route = if frac_imperv <= 0.0 || frac_imperv >= 1.0 {
                SubareaRouting::Outlet
            } else {
                sc.route_to
            };
            match route {
                SubareaRouting::Imperv => {
                    sub.subareas[PERV].route_to = RouteTo::Imperv;
                    sub.subareas[PERV].f_outlet = f_outlet_kept;
                }
                SubareaRouting::Perv => {
                    sub.subareas[IMPERV0].route_to = RouteTo::Perv;
                    sub.subareas[IMPERV1].route_to = RouteTo::Perv;
                    sub.subareas[IMPERV0].f_outlet = f_outlet_kept;
                    sub.subareas[IMPERV1].f_outlet = f_outlet_kept;
                }
                SubareaRouting::Outlet => {}
            }
            sub.validate();
            subcatchments.push(sub);
        }

        // ---- 节点 ----
        let mut nodes = Vec::with_capacity(cfg.nodes.len());
        for nc in &cfg.nodes {
            let full_depth = nc.max_depth / ucf_len;
            let surf_area = nc.area / ucf_sq;
            let kind = match &nc.kind {
                NodeKindConfig::Junction => NodeKind::Junction,
                NodeKindConfig::Outfall { route_to } => NodeKind::Outfall(Outfall {
                    route_to: route_to.as_deref().and_then(|n| cfg.find_subcatch(n)),
                    v_routed: 0.0,
                    w_routed: vec![0.0; n_pollut],
                }),
                NodeKindConfig::Divider {
                    diversion_link,
                    kind,
                    q_min,
                } => NodeKind::Divider(Divider {
                    link: cfg.find_link(diversion_link).unwrap_or(usize::MAX),
                    kind: match kind {
                        dh_config::DividerKind::Cutoff => DividerKind::Cutoff,
                        dh_config::DividerKind::Overflow => DividerKind::Overflow,
                    },
                    q_min: q_min / ucf_flow,
                }),
                NodeKindConfig::Storage { curve } => NodeKind::Storage(Storage {
                    curve: match curve {
                        StorageCurveConfig::Functional {
                            coeff,
                            exponent,
                            constant,
                        } => StorageCurve::Functional {
                            coeff: coeff / ucf_sq,
                            exponent: *exponent,
                            constant: constant / ucf_sq,
                        },
                        StorageCurveConfig::Tabular { points } => StorageCurve::Tabular {
                            points: points
                                .iter()
                                .map(|&(d, a)| (d / ucf_len, a / ucf_sq))
                                .collect(),
                        },
                    },
                    hrt: 0.0,
                }),
            };
            let mut node = Node {
                name: nc.name.clone(),
                kind,
                invert_elev: nc.invert_elev / ucf_len,
                full_depth,
                full_volume: 0.0,
                surf_area,
                ponded_area: nc.ponded_area / ucf_sq,
                init_depth: nc.init_depth / ucf_len,
                degree: 0,
                rpt_flag: nc.report,
                old_depth: 0.0,
                new_depth: 0.0,
                old_volume: 0.0,
                new_volume: 0.0,
                old_lat_flow: 0.0,
                new_lat_flow: 0.0,
                old_flow_inflow: 0.0,
                inflow: 0.0,
                outflow: 0.0,
                old_net_inflow: 0.0,
                old_overflow: 0.0,
                overflow: 0.0,
                losses: 0.0,
                updated: false,
                old_qual: vec![0.0; n_pollut],
                new_qual: vec![0.0; n_pollut],
            };
            node.full_volume = match &node.kind {
                NodeKind::Storage(s) => s.curve.volume(full_depth),
                _ => surf_area * full_depth,
            };
            nodes.push(node);
        }

        // ---- 管段 ----
        let mut links = Vec::with_capacity(cfg.links.len());
        for lc in &cfg.links {
            let node1 = cfg.find_node(&lc.from).ok_or_else(|| {
                EngineError::Config(dh_config::ConfigError::UnknownReference {
                    kind: "节点",
                    name: lc.from.clone(),
                })
            })?;
            let node2 = cfg.find_node(&lc.to).ok_or_else(|| {
                EngineError::Config(dh_config::ConfigError::UnknownReference {
                    kind: "节点",
                    name: lc.to.clone(),
                })
            })?;
            let (kind, xsect) = match &lc.kind {
                LinkKindConfig::Conduit {
                    length,
                    roughness,
                    barrels,
                    xsect,
                    evap_loss_rate,
                    seep_loss_rate,
                } => (
                    LinkKind::Conduit(Conduit {
                        length: length / ucf_len,
                        roughness: *roughness,
                        barrels: (*barrels).max(1),
                        slope: 0.0,
                        beta: 0.0,
                        q1: 0.0,
                        q2: 0.0,
                        q1_old: 0.0,
                        q2_old: 0.0,
                        a1: 0.0,
                        a2: 0.0,
                        full_state: FullState::None,
                        capacity_limited: false,
                        evap_loss_rate: evap_loss_rate / ucf_flow,
                        seep_loss_rate: seep_loss_rate / ucf_flow,
                    }),
                    build_xsect(xsect, ucf_len),
                ),
                LinkKindConfig::Pump => (LinkKind::Pump, Xsect::Dummy),
                LinkKindConfig::Orifice { coeff } => (
                    LinkKind::Orifice(crate::objects::link::Orifice {
                        coeff: coeff / ucf_flow,
                    }),
                    Xsect::Dummy,
                ),
                LinkKindConfig::Weir { coeff } => (
                    LinkKind::Weir(crate::objects::link::Weir {
                        coeff: coeff / ucf_flow,
                    }),
                    Xsect::Dummy,
                ),
                LinkKindConfig::Outlet { coeff, exponent } => (
                    LinkKind::Outlet(crate::objects::link::OutletRating {
                        coeff: coeff / ucf_flow,
                        exponent: *exponent,
                    }),
                    Xsect::Dummy,
                ),
            };
            links.push(Link {
                name: lc.name.clone(),
                kind,
                node1,
                node2,
                xsect,
                offset1: lc.offset1 / ucf_len,
                offset2: lc.offset2 / ucf_len,
                q_full: 0.0,
                direction: 1,
                rpt_flag: lc.report,
                old_flow: 0.0,
                new_flow: lc.init_flow / ucf_flow,
                old_depth: 0.0,
                new_depth: 0.0,
                old_volume: 0.0,
                new_volume: 0.0,
                setting: 1.0,
                target_setting: 1.0,
                old_qual: vec![0.0; n_pollut],
                new_qual: vec![0.0; n_pollut],
            });
        }

        let pollutants = cfg
            .pollutants
            .iter()
            .map(|p| Pollutant {
                name: p.name.clone(),
                units_code: p.units.code(),
            })
            .collect();
        let land_uses = cfg
            .land_uses
            .iter()
            .map(|lu| LandUse {
                name: lu.name.clone(),
            })
            .collect();

        // ---- 气候 ----
        let mut climate = Climate::new(
            cfg.options.evap.rate / ucf_evap,
            cfg.options
                .evap
                .monthly
                .map(|rates| rates.map(|r| r / ucf_evap)),
            cfg.options.evap.dry_only,
        );
        climate.air_temp = to_fahrenheit(cfg.options.air_temp, &units);
        climate.snow_temp = to_fahrenheit(cfg.options.snow_temp, &units);

        let report_start_ms = cfg
            .options
            .report_start
            .map(|d| (d - cfg.options.start_date).num_milliseconds() as f64)
            .unwrap_or(0.0)
            .max(0.0);

        let mut project = Project {
            title: cfg.title.clone(),
            units,
            routing_model: cfg.options.routing_model,
            wet_step: cfg.options.wet_step as f64,
            dry_step: cfg.options.dry_step as f64,
            routing_step: cfg.options.routing_step,
            report_step: cfg.options.report_step as f64,
            start_date: cfg.options.start_date,
            report_start_ms,
            total_duration_ms: cfg.options.total_duration_ms(),
            allow_ponding: cfg.options.allow_ponding,
            ignore_snowmelt: cfg.options.ignore_snowmelt,
            ignore_gwater: cfg.options.ignore_gwater,
            ignore_quality: cfg.options.ignore_quality,
            ignore_routing: cfg.options.ignore_routing,
            runoff_iface_mode: match &cfg.options.runoff_file {
                None => IfaceMode::None,
                Some(f) if f.mode == FileMode::Use => IfaceMode::Use,
                Some(_) => IfaceMode::Save,
            },
            gages,
            subcatchments,
            nodes,
            links,
            pollutants,
            land_uses,
            climate,
            massbal: MassBalance::default(),
            clock: Clock::default(),
            runoff_flags: RunoffFlags::default(),
            error_code: None,
            warning_count: 0,
        };
        project.validate_links();
        project.init_state();
        Ok(project)
    }

    /// 管道静态校验与节点出流度数统计
    fn validate_links(&mut self) {
        for j in 0..self.links.len() {
            let elev1 = self.nodes[self.links[j].node1].invert_elev + self.links[j].offset1;
            let elev2 = self.nodes[self.links[j].node2].invert_elev + self.links[j].offset2;
            if self.links[j].is_conduit() {
                let adverse = self.links[j].validate_conduit(elev1, elev2);
                if adverse {
                    // 逆坡在树状校验中按 Slope 错误上报，此处仅告警
                    self.warn(&format!("管道 {} 坡度为负", self.links[j].name));
                }
            }
            // 出流度数按校正后的流向计
            let up = if self.links[j].direction >= 0 {
                self.links[j].node1
            } else {
                self.links[j].node2
            };
            self.nodes[up].degree += 1;
        }
        for g in self.subcatchments.iter().filter_map(|s| s.gage) {
            self.gages[g].is_used = true;
        }
    }

    /// 初始化全部动态状态
    pub fn init_state(&mut self) {
        for sc in &mut self.subcatchments {
            sc.init_state();
        }
        for node in &mut self.nodes {
            node.new_depth = node.init_depth;
            node.old_depth = node.init_depth;
        }
        for link in &mut self.links {
            link.old_flow = link.new_flow;
            link.setting = 1.0;
            link.target_setting = 1.0;
        }
        self.clock = Clock::default();
        self.runoff_flags = RunoffFlags::default();
        self.massbal = MassBalance::default();
    }

    /// 置位粘性错误码（首个错误保持）
    pub fn set_error(&mut self, code: ErrorCode, message: &str) {
        log::error!("{}: {}", code, message);
        if self.error_code.is_none() {
            self.error_code = Some(code);
        }
    }

    /// 粘性错误码是否已置位
    pub fn has_error(&self) -> bool {
        self.error_code.is_some()
    }

    /// 记一条告警（从不置位错误码）
    pub fn warn(&mut self, message: &str) {
        log::warn!("{}", message);
        self.warning_count += 1;
    }

    /// 经过时刻对应的日历时间
    pub fn date_at(&self, elapsed_ms: f64) -> NaiveDateTime {
        self.start_date + Duration::milliseconds(elapsed_ms as i64)
    }

    /// 日历时间对应的经过时刻 [ms]
    pub fn elapsed_at(&self, date: NaiveDateTime) -> f64 {
        (date - self.start_date).num_milliseconds() as f64
    }

    /// 经过时刻对应的纪元天数（结果文件日期格式）
    pub fn days_at(&self, elapsed_ms: f64) -> f64 {
        let since_epoch = self.start_date - epoch();
        (since_epoch.num_milliseconds() as f64 + elapsed_ms) / 86_400_000.0
    }

    /// 污染物个数
    pub fn n_pollut(&self) -> usize {
        if self.ignore_quality {
            0
        } else {
            self.pollutants.len()
        }
    }

    /// 管网当前蓄水总量（节点 + 管段）[ft³]
    pub fn system_storage(&self) -> f64 {
        let node_v: f64 = self.nodes.iter().map(|n| n.new_volume).sum();
        let link_v: f64 = self.links.iter().map(|l| l.new_volume).sum();
        node_v + link_v
    }

    /// 地表当前蓄水总量 [ft³]
    pub fn surface_storage(&self) -> f64 {
        self.subcatchments.iter().map(|s| s.get_storage()).sum()
    }
}

/// 构建断面（换算为内部单位）
fn build_xsect(cfg: &XsectConfig, ucf_len: f64) -> Xsect {
    match cfg {
        XsectConfig::Dummy => Xsect::Dummy,
        XsectConfig::Circular { diameter } => Xsect::Circular {
            diameter: diameter / ucf_len,
        },
        XsectConfig::RectClosed { width, height } => Xsect::RectClosed {
            width: width / ucf_len,
            height: height / ucf_len,
        },
        XsectConfig::RectOpen { width, height } => Xsect::RectOpen {
            width: width / ucf_len,
            height: height / ucf_len,
        },
        XsectConfig::Trapezoidal {
            base_width,
            height,
            side_slope,
        } => Xsect::Trapezoidal {
            base_width: base_width / ucf_len,
            height: height / ucf_len,
            side_slope: *side_slope,
        },
    }
}

/// 用户单位气温换算为内部华氏度
fn to_fahrenheit(temp: f64, units: &Units) -> f64 {
    match units.system() {
        dh_foundation::units::UnitSystem::Us => temp,
        dh_foundation::units::UnitSystem::Si => temp * 9.0 / 5.0 + 32.0,
    }
}

/// 避免分母为零的权重计算
pub fn interp_weight(t: f64, t_old: f64, t_new: f64) -> f64 {
    let span = t_new - t_old;
    if span.abs() < TINY {
        1.0
    } else {
        ((t - t_old) / span).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// 单排放口的最小项目（测试公用）
    pub(crate) fn minimal_project() -> Project {
        let cfg = ProjectConfig::from_json(
            &serde_json::json!({
                "options": {
                    "start_date": "2023-06-01T00:00:00",
                    "end_date": "2023-06-01T06:00:00"
                },
                "nodes": [
                    {"name": "O1", "type": "outfall", "invert_elev": 0.0}
                ]
            })
            .to_string(),
        )
        .unwrap();
        Project::from_config(&cfg).unwrap()
    }
}
