// crates/dh_physics/src/objects/mod.rs

//! 引擎对象目录
//!
//! 子汇水区、节点、管段与断面的对象定义。所有目录在运行打开时
//! 一次建好，模拟期间就地修改，运行关闭时销毁。

pub mod link;
pub mod node;
pub mod subcatch;
pub mod xsect;

pub use link::{Conduit, FullState, Link, LinkKind, Orifice, OutletRating, Weir};
pub use node::{Divider, DividerKind, Node, NodeKind, Outfall, Storage, StorageCurve};
pub use subcatch::{LandFactor, RouteTo, Subarea, Subcatchment, IMPERV0, IMPERV1, PERV};
pub use xsect::Xsect;

/// 污染物
#[derive(Debug, Clone)]
pub struct Pollutant {
    /// 名称
    pub name: String,
    /// 浓度单位代码（结果文件用）
    pub units_code: i32,
}

/// 土地利用
#[derive(Debug, Clone)]
pub struct LandUse {
    /// 名称
    pub name: String,
}
