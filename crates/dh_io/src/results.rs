// crates/dh_io/src/results.rs

//! 二进制结果文件
//!
//! 单个文件按写入顺序分三个区：**前导区**（魔数、版本、单位代码、
//! 目录规模、对象名、污染物单位、静态输入量、各对象类的结果变量
//! 代码表、报告起始日期与步长）、**逐报告期定宽记录流**、
//! **尾记录**（三个区的偏移、报告期数、终止错误码、收尾魔数）。
//!
//! 每个报告期的记录宽度固定：
//!
//! ```text
//! 8 + nSubcatch·nSubcatchResults·4 + nNodes·nNodeResults·4
//!   + nLinks·nLinkResults·4 + MAX_SYS_RESULTS·4
//! ```
//!
//! 随机读取按周期起点与对象类内偏移纯算术寻址，绝不扫描。
//! 系统级变量用 f64 累加、f32 写出；面积加权均值对零总面积
//! 设防。出错的运行仍会写出尾记录（错误码在收尾魔数之前），
//! 下游读取方据此识别部分结果。

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use dh_foundation::consts::MAX_FILE_SIZE;
use dh_foundation::units::Quantity;
use dh_physics::error::ErrorCode;
use dh_physics::objects::link::LinkKind;
use dh_physics::objects::{link, node, subcatch};
use dh_physics::project::interp_weight;
use dh_physics::Project;

use crate::error::{IoError, IoResult};

/// 结果文件魔数
pub const MAGIC: i32 = 516_114_522;

/// 引擎版本代码
pub const VERSION_CODE: i32 = 51_000;

/// 系统级结果变量个数
pub const MAX_SYS_RESULTS: usize = 15;

/// 子汇水区基础结果变量个数（含一个冲刷占位）
pub const MAX_SUBCATCH_RESULTS: usize = 9;

/// 节点基础结果变量个数（含一个水质占位）
pub const MAX_NODE_RESULTS: usize = 7;

/// 管段基础结果变量个数（含一个水质占位）
pub const MAX_LINK_RESULTS: usize = 6;

/// 系统级结果变量下标
pub mod sys_index {
    /// 气温
    pub const TEMPERATURE: usize = 0;
    /// 降雨
    pub const RAINFALL: usize = 1;
    /// 积雪深
    pub const SNOWDEPTH: usize = 2;
    /// 入渗
    pub const INFIL: usize = 3;
    /// 径流
    pub const RUNOFF: usize = 4;
    /// 旱季污水入流
    pub const DWFLOW: usize = 5;
    /// 地下水入流
    pub const GWFLOW: usize = 6;
    /// 入流入渗
    pub const IIFLOW: usize = 7;
    /// 外部入流
    pub const EXFLOW: usize = 8;
    /// 总入流
    pub const INFLOW: usize = 9;
    /// 内涝
    pub const FLOODING: usize = 10;
    /// 排放口出流
    pub const OUTFLOW: usize = 11;
    /// 系统蓄量
    pub const STORAGE: usize = 12;
    /// 蒸发
    pub const EVAP: usize = 13;
    /// 潜在蒸发
    pub const PET: usize = 14;
}

/// 静态输入量代码
mod input_code {
    pub const TYPE_CODE: i32 = 0;
    pub const AREA: i32 = 1;
    pub const INVERT: i32 = 2;
    pub const MAX_DEPTH: i32 = 3;
    pub const OFFSET: i32 = 4;
    pub const LENGTH: i32 = 5;
}

/// 二进制结果存储
pub struct ResultsStore {
    file: File,
    /// 参与报告的对象下标
    rpt_subcatch: Vec<usize>,
    rpt_nodes: Vec<usize>,
    rpt_links: Vec<usize>,
    /// 每个对象类的结果变量个数
    n_subcatch_results: usize,
    n_node_results: usize,
    n_link_results: usize,
    /// 单个报告期的字节宽度
    bytes_per_period: u64,
    /// 三个区的起始偏移
    id_start_pos: u64,
    input_start_pos: u64,
    output_start_pos: u64,
    /// 已写报告期数
    n_periods: i32,
    /// 结果缓冲
    subcatch_buf: Vec<f32>,
    node_buf: Vec<f32>,
    link_buf: Vec<f32>,
    sys_buf: [f32; MAX_SYS_RESULTS],
}

impl ResultsStore {
    /// 打开结果文件并写出前导区
    pub fn open(prj: &mut Project, path: &Path) -> IoResult<Self> {
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
        {
            Ok(f) => f,
            Err(e) => {
                prj.set_error(ErrorCode::OutFile, &path.display().to_string());
                return Err(IoError::Open {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        let n_pollut = prj.n_pollut();
        let n_subcatch_results = MAX_SUBCATCH_RESULTS - 1 + n_pollut;
        let n_node_results = MAX_NODE_RESULTS - 1 + n_pollut;
        let n_link_results = MAX_LINK_RESULTS - 1 + n_pollut;

        let rpt_subcatch: Vec<usize> = (0..prj.subcatchments.len())
            .filter(|&j| prj.subcatchments[j].rpt_flag)
            .collect();
        let rpt_nodes: Vec<usize> = (0..prj.nodes.len())
            .filter(|&j| prj.nodes[j].rpt_flag)
            .collect();
        let rpt_links: Vec<usize> = (0..prj.links.len())
            .filter(|&j| prj.links[j].rpt_flag)
            .collect();

        let bytes_per_period = 8
            + (rpt_subcatch.len() * n_subcatch_results * 4
                + rpt_nodes.len() * n_node_results * 4
                + rpt_links.len() * n_link_results * 4
                + MAX_SYS_RESULTS * 4) as u64;

        let mut store = Self {
            file,
            rpt_subcatch,
            rpt_nodes,
            rpt_links,
            n_subcatch_results,
            n_node_results,
            n_link_results,
            bytes_per_period,
            id_start_pos: 0,
            input_start_pos: 0,
            output_start_pos: 0,
            n_periods: 0,
            subcatch_buf: vec![0.0; n_subcatch_results],
            node_buf: vec![0.0; n_node_results],
            link_buf: vec![0.0; n_link_results],
            sys_buf: [0.0; MAX_SYS_RESULTS],
        };

        if let Err(e) = store.write_prologue(prj) {
            prj.set_error(ErrorCode::OutWrite, &path.display().to_string());
            return Err(e);
        }

        // 尺寸预检：预计总尺寸必须落在可寻址范围内
        let n_report_periods =
            prj.total_duration_ms / 1000.0 / prj.report_step;
        let projected =
            store.output_start_pos as f64 + store.bytes_per_period as f64 * n_report_periods;
        if projected >= MAX_FILE_SIZE {
            prj.set_error(ErrorCode::FileSize, &path.display().to_string());
            return Err(IoError::SizeLimit { projected });
        }
        Ok(store)
    }

    /// 单个报告期的字节宽度
    pub fn bytes_per_period(&self) -> u64 {
        self.bytes_per_period
    }

    /// 已写报告期数
    pub fn n_periods(&self) -> i32 {
        self.n_periods
    }

    /// 写出前导区
    fn write_prologue(&mut self, prj: &Project) -> IoResult<()> {
        let w = &mut self.file;
        w.seek(SeekFrom::Start(0))?;
        write_i32(w, MAGIC)?;
        write_i32(w, VERSION_CODE)?;
        write_i32(w, prj.units.flow_units().code())?;
        write_i32(w, self.rpt_subcatch.len() as i32)?;
        write_i32(w, self.rpt_nodes.len() as i32)?;
        write_i32(w, self.rpt_links.len() as i32)?;
        let n_pollut = prj.n_pollut();
        write_i32(w, n_pollut as i32)?;

        // 对象名（参与报告的对象 + 全部污染物）
        self.id_start_pos = w.stream_position()?;
        for &j in &self.rpt_subcatch {
            write_id(w, &prj.subcatchments[j].name)?;
        }
        for &j in &self.rpt_nodes {
            write_id(w, &prj.nodes[j].name)?;
        }
        for &j in &self.rpt_links {
            write_id(w, &prj.links[j].name)?;
        }
        for p in 0..n_pollut {
            write_id(w, &prj.pollutants[p].name)?;
        }
        for p in 0..n_pollut {
            write_i32(w, prj.pollutants[p].units_code)?;
        }

        // 静态输入量
        self.input_start_pos = w.stream_position()?;
        let ucf_len = prj.units.ucf(Quantity::Length);
        let ucf_area = prj.units.ucf(Quantity::LandArea);

        // 子汇水区：面积
        write_i32(w, 1)?;
        write_i32(w, input_code::AREA)?;
        for &j in &self.rpt_subcatch {
            write_f32(w, (prj.subcatchments[j].area * ucf_area) as f32)?;
        }

        // 节点：类型、井底高程、满深
        write_i32(w, 3)?;
        write_i32(w, input_code::TYPE_CODE)?;
        write_i32(w, input_code::INVERT)?;
        write_i32(w, input_code::MAX_DEPTH)?;
        for &j in &self.rpt_nodes {
            let node = &prj.nodes[j];
            write_i32(w, node.type_code())?;
            write_f32(w, (node.invert_elev * ucf_len) as f32)?;
            write_f32(w, (node.full_depth * ucf_len) as f32)?;
        }

        // 管段：类型、两端偏移、满深、长度
        write_i32(w, 5)?;
        write_i32(w, input_code::TYPE_CODE)?;
        write_i32(w, input_code::OFFSET)?;
        write_i32(w, input_code::OFFSET)?;
        write_i32(w, input_code::MAX_DEPTH)?;
        write_i32(w, input_code::LENGTH)?;
        for &j in &self.rpt_links {
            let link = &prj.links[j];
            write_i32(w, link.type_code())?;
            let mut x = [0.0f32; 4];
            if !matches!(link.kind, LinkKind::Pump) {
                x[0] = (link.offset1 * ucf_len) as f32;
                x[1] = (link.offset2 * ucf_len) as f32;
                if link.direction < 0 {
                    x.swap(0, 1);
                }
                x[2] = if matches!(link.kind, LinkKind::Outlet(_)) {
                    0.0
                } else {
                    (link.xsect.y_full() * ucf_len) as f32
                };
                x[3] = (link.length() * ucf_len) as f32;
            }
            for v in x {
                write_f32(w, v)?;
            }
        }

        // 子汇水区结果变量代码
        write_i32(w, self.n_subcatch_results as i32)?;
        for code in 0..(MAX_SUBCATCH_RESULTS - 1) as i32 {
            write_i32(w, code)?;
        }
        for p in 0..n_pollut {
            write_i32(w, (subcatch::result_index::WASHOFF + p) as i32)?;
        }

        // 节点结果变量代码
        write_i32(w, self.n_node_results as i32)?;
        for code in 0..(MAX_NODE_RESULTS - 1) as i32 {
            write_i32(w, code)?;
        }
        for p in 0..n_pollut {
            write_i32(w, (node::result_index::QUAL + p) as i32)?;
        }

        // 管段结果变量代码
        write_i32(w, self.n_link_results as i32)?;
        for code in 0..(MAX_LINK_RESULTS - 1) as i32 {
            write_i32(w, code)?;
        }
        for p in 0..n_pollut {
            write_i32(w, (link::result_index::QUAL + p) as i32)?;
        }

        // 系统级结果变量代码
        write_i32(w, MAX_SYS_RESULTS as i32)?;
        for code in 0..MAX_SYS_RESULTS as i32 {
            write_i32(w, code)?;
        }

        // 报告起始日期：报告起点晚于模拟起点时，前移一个报告期
        let report_step_days = prj.report_step / 86_400.0;
        let start_days = prj.days_at(0.0);
        let report_start_days = prj.days_at(prj.report_start_ms);
        let z = if start_days + report_step_days > report_start_days {
            start_days
        } else {
            let periods = ((report_start_days - start_days) / report_step_days).floor() - 1.0;
            start_days + periods * report_step_days
        };
        write_f64(w, z)?;
        write_i32(w, prj.report_step as i32)?;

        self.output_start_pos = w.stream_position()?;
        Ok(())
    }

    /// 写出当前报告期的结果记录
    pub fn save_results(&mut self, prj: &mut Project, report_time_ms: f64) {
        if report_time_ms < prj.report_start_ms {
            return;
        }
        if let Err(e) = self.try_save_results(prj, report_time_ms) {
            log::error!("结果记录写出失败: {}", e);
            prj.set_error(ErrorCode::OutWrite, "结果记录写出失败");
        }
    }

    fn try_save_results(&mut self, prj: &mut Project, report_time_ms: f64) -> IoResult<()> {
        // 系统级累加用 f64，写出用 f32
        let mut sys = [0.0f64; MAX_SYS_RESULTS];

        let date = prj.days_at(report_time_ms);
        write_f64(&mut self.file, date)?;

        if !prj.subcatchments.is_empty() {
            self.save_subcatch_results(prj, report_time_ms, &mut sys)?;
        }
        if !prj.nodes.is_empty() {
            self.save_node_results(prj, report_time_ms, &mut sys)?;
        }
        if !prj.links.is_empty() {
            self.save_link_results(prj, report_time_ms, &mut sys)?;
        }

        sys[sys_index::TEMPERATURE] = prj.units.temperature(prj.climate.air_temp);
        sys[sys_index::PET] = prj.climate.evap_rate * prj.units.ucf(Quantity::EvapRate);

        for (i, &v) in sys.iter().enumerate() {
            self.sys_buf[i] = v as f32;
        }
        write_f32_slice(&mut self.file, &self.sys_buf)?;
        self.n_periods += 1;
        Ok(())
    }

    /// 子汇水区结果与系统级面积加权量
    fn save_subcatch_results(
        &mut self,
        prj: &mut Project,
        report_time_ms: f64,
        sys: &mut [f64; MAX_SYS_RESULTS],
    ) -> IoResult<()> {
        // 报告期降雨更新到各雨量计
        let units = prj.units;
        for gage in &mut prj.gages {
            gage.set_report_rainfall(&units);
        }

        // 报告时刻在新旧产流时刻之间的权重
        let f = interp_weight(
            report_time_ms,
            prj.clock.old_runoff_time,
            prj.clock.new_runoff_time,
        );

        let ucf_area = units.ucf(Quantity::LandArea);
        let ucf_evap = units.ucf(Quantity::EvapRate);
        let mut total_area = 0.0f64;

        let mut rpt_cursor = 0;
        for j in 0..prj.subcatchments.len() {
            let sc = &prj.subcatchments[j];
            let report_rain = sc
                .gage
                .map_or(0.0, |g| prj.gages[g].report_rainfall);
            sc.get_results(f, report_rain, &units, &mut self.subcatch_buf);
            if sc.rpt_flag {
                write_f32_slice(&mut self.file, &self.subcatch_buf)?;
                rpt_cursor += 1;
            }

            // 系统级量按面积加权
            let area = sc.area * ucf_area;
            total_area += area;
            sys[sys_index::RAINFALL] +=
                self.subcatch_buf[subcatch::result_index::RAINFALL] as f64 * area;
            sys[sys_index::SNOWDEPTH] +=
                self.subcatch_buf[subcatch::result_index::SNOWDEPTH] as f64 * area;
            sys[sys_index::EVAP] +=
                self.subcatch_buf[subcatch::result_index::EVAP] as f64 * area;
            if let Some(gw) = &sc.groundwater {
                sys[sys_index::EVAP] += gw.evap_loss * ucf_evap * area;
            }
            sys[sys_index::INFIL] +=
                self.subcatch_buf[subcatch::result_index::INFIL] as f64 * area;
            sys[sys_index::RUNOFF] += self.subcatch_buf[subcatch::result_index::RUNOFF] as f64;
        }
        debug_assert_eq!(rpt_cursor, self.rpt_subcatch.len());

        // 零总面积设防：均值报零而不是 NaN
        if total_area > 0.0 {
            sys[sys_index::EVAP] /= total_area;
            sys[sys_index::RAINFALL] /= total_area;
            sys[sys_index::SNOWDEPTH] /= total_area;
            sys[sys_index::INFIL] /= total_area;
        }
        Ok(())
    }

    /// 节点结果与系统级流量
    fn save_node_results(
        &mut self,
        prj: &mut Project,
        report_time_ms: f64,
        sys: &mut [f64; MAX_SYS_RESULTS],
    ) -> IoResult<()> {
        let units = prj.units;
        let f = interp_weight(
            report_time_ms,
            prj.clock.old_routing_time,
            prj.clock.new_routing_time,
        );
        let ucf_flow = units.ucf(Quantity::Flow);

        for j in 0..prj.nodes.len() {
            let node = &prj.nodes[j];
            node.get_results(f, &units, &mut self.node_buf);
            if node.rpt_flag {
                write_f32_slice(&mut self.file, &self.node_buf)?;
            }
            sys[sys_index::STORAGE] += self.node_buf[node::result_index::VOLUME] as f64;
        }

        let step = prj.massbal.flow.step;
        sys[sys_index::FLOODING] = step.flooding * ucf_flow;
        sys[sys_index::OUTFLOW] = step.outflow * ucf_flow;
        sys[sys_index::DWFLOW] = step.dw_inflow * ucf_flow;
        sys[sys_index::GWFLOW] = step.gw_inflow * ucf_flow;
        sys[sys_index::IIFLOW] = step.ii_inflow * ucf_flow;
        sys[sys_index::EXFLOW] = step.ex_inflow * ucf_flow;
        sys[sys_index::INFLOW] = sys[sys_index::RUNOFF]
            + sys[sys_index::DWFLOW]
            + sys[sys_index::GWFLOW]
            + sys[sys_index::IIFLOW]
            + sys[sys_index::EXFLOW];
        Ok(())
    }

    /// 管段结果与系统级蓄量
    fn save_link_results(
        &mut self,
        prj: &mut Project,
        report_time_ms: f64,
        sys: &mut [f64; MAX_SYS_RESULTS],
    ) -> IoResult<()> {
        let units = prj.units;
        let f = interp_weight(
            report_time_ms,
            prj.clock.old_routing_time,
            prj.clock.new_routing_time,
        );
        let ucf_vol = units.ucf(Quantity::Volume);

        for j in 0..prj.links.len() {
            let link = &prj.links[j];
            link.get_results(f, &units, &mut self.link_buf);
            if link.rpt_flag {
                write_f32_slice(&mut self.file, &self.link_buf)?;
            }
            // 管段蓄量按新旧容积加权
            let v = ((1.0 - f) * link.old_volume + f * link.new_volume) * ucf_vol;
            sys[sys_index::STORAGE] += v;
        }
        Ok(())
    }

    /// 写出尾记录
    ///
    /// 无论运行是否出错都会执行；错误码落在收尾魔数之前，供
    /// 下游读取方识别部分结果。
    pub fn end(&mut self, prj: &mut Project) {
        let error_code = prj.error_code.map_or(0, |c| c.code());
        let result: IoResult<()> = (|| {
            self.file.seek(SeekFrom::End(0))?;
            write_i32(&mut self.file, self.id_start_pos as i32)?;
            write_i32(&mut self.file, self.input_start_pos as i32)?;
            write_i32(&mut self.file, self.output_start_pos as i32)?;
            write_i32(&mut self.file, self.n_periods)?;
            write_i32(&mut self.file, error_code)?;
            write_i32(&mut self.file, MAGIC)?;
            self.file.flush()?;
            Ok(())
        })();
        if result.is_err() {
            prj.set_error(ErrorCode::OutWrite, "结果文件尾记录写出失败");
        }
    }

    // ============================================================
    // 随机读取
    // ============================================================

    /// 读取第 `period` 个报告期（1 起）的日期
    pub fn read_date_time(&mut self, period: i32) -> IoResult<f64> {
        let pos = self.output_start_pos + (period - 1) as u64 * self.bytes_per_period;
        self.file.seek(SeekFrom::Start(pos))?;
        read_f64(&mut self.file)
    }

    /// 读取某报告期内第 `index` 个参与报告的子汇水区结果
    pub fn read_subcatch_results(&mut self, period: i32, index: usize) -> IoResult<&[f32]> {
        let mut pos = self.output_start_pos + (period - 1) as u64 * self.bytes_per_period;
        pos += 8 + (index * self.n_subcatch_results * 4) as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        read_f32_slice(&mut self.file, &mut self.subcatch_buf)?;
        Ok(&self.subcatch_buf)
    }

    /// 读取某报告期内第 `index` 个参与报告的节点结果
    pub fn read_node_results(&mut self, period: i32, index: usize) -> IoResult<&[f32]> {
        let mut pos = self.output_start_pos + (period - 1) as u64 * self.bytes_per_period;
        pos += 8 + (self.rpt_subcatch.len() * self.n_subcatch_results * 4) as u64;
        pos += (index * self.n_node_results * 4) as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        read_f32_slice(&mut self.file, &mut self.node_buf)?;
        Ok(&self.node_buf)
    }

    /// 读取某报告期内第 `index` 个参与报告的管段结果
    ///
    /// 顺带读入紧随管段区之后的系统级结果。
    pub fn read_link_results(&mut self, period: i32, index: usize) -> IoResult<&[f32]> {
        let mut pos = self.output_start_pos + (period - 1) as u64 * self.bytes_per_period;
        pos += 8 + (self.rpt_subcatch.len() * self.n_subcatch_results * 4) as u64;
        pos += (self.rpt_nodes.len() * self.n_node_results * 4) as u64;
        pos += (index * self.n_link_results * 4) as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        read_f32_slice(&mut self.file, &mut self.link_buf)?;
        let mut sys = [0.0f32; MAX_SYS_RESULTS];
        read_f32_slice(&mut self.file, &mut sys)?;
        self.sys_buf = sys;
        Ok(&self.link_buf)
    }

    /// 最近一次 [`Self::read_link_results`] 顺带读入的系统级结果
    pub fn sys_results(&self) -> &[f32; MAX_SYS_RESULTS] {
        &self.sys_buf
    }
}

// ============================================================
// 标量读写
// ============================================================

fn write_id(w: &mut impl Write, id: &str) -> IoResult<()> {
    write_i32(w, id.len() as i32)?;
    w.write_all(id.as_bytes())?;
    Ok(())
}

fn write_i32(w: &mut impl Write, x: i32) -> IoResult<()> {
    w.write_all(&x.to_le_bytes())?;
    Ok(())
}

fn write_f32(w: &mut impl Write, x: f32) -> IoResult<()> {
    w.write_all(&x.to_le_bytes())?;
    Ok(())
}

fn write_f64(w: &mut impl Write, x: f64) -> IoResult<()> {
    w.write_all(&x.to_le_bytes())?;
    Ok(())
}

fn write_f32_slice(w: &mut impl Write, xs: &[f32]) -> IoResult<()> {
    for &x in xs {
        w.write_all(&x.to_le_bytes())?;
    }
    Ok(())
}

fn read_f64(r: &mut impl Read) -> IoResult<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|_| IoError::Read("结果文件截断".to_string()))?;
    Ok(f64::from_le_bytes(buf))
}

fn read_f32_slice(r: &mut impl Read, out: &mut [f32]) -> IoResult<()> {
    let mut buf = [0u8; 4];
    for x in out.iter_mut() {
        r.read_exact(&mut buf)
            .map_err(|_| IoError::Read("结果文件截断".to_string()))?;
        *x = f32::from_le_bytes(buf);
    }
    Ok(())
}

// ============================================================
// 测试
// ============================================================
