// crates/dh_io/src/hotstart.rs

//! 热启动快照编解码
//!
//! 热启动文件是全部动态模拟状态的带版本二进制快照，足以让后续
//! 运行免重放历史直接续算。写出固定为版本 4；读取兼容版本 1–4，
//! 低版本按其载荷布局降级。
//!
//! # 文件布局（版本 4，全部小端）
//!
//! ```text
//! [魔数: "SWMM5-HOTSTART4"]
//! [i32 × 6: nSubcatch, nLandUses, nNodes, nLinks, nPollut, flowUnits]
//! 产流载荷（版本 ≥ 3）：每个子汇水区按目录序
//!   [f64 × 3: 子面积积水深] [f64: 当前径流]
//!   [f64 × 6: 入渗模型状态]
//!   [f64 × 4: 地下水状态]（仅附着时）
//!   [f64 × 5 × 3: 积雪状态]（仅附着时）
//!   [f64 × N: 径流水质] [f64 × N: 积水水质]
//!   每个土地利用 [f64 × N: 累积量] [f64: 最近清扫日期]（仅 N>0）
//! 演算载荷：每个节点
//!   [f32 × 2: 水深, 旁侧入流] [f32: HRT]（版本 ≥ 4 的调蓄节点）
//!   [f32 × N: 水质]（版本 ≤ 2 后随 N 个历史补零，读后丢弃）
//! 每个管段
//!   [f32 × 3: 流量, 水深, 开度] [f32 × N: 水质]
//! ```
//!
//! # NaN 策略
//!
//! 每个标量读后即检：NaN 置位 `HotstartFileRead` 并中止后续
//! 读取，已恢复的子汇水区状态保持有效（不做回滚）。
//!
//! # 开度恢复
//!
//! 管段开度经由与实时控制一致的路径重放：先 `set_target_setting`
//! 再 `set_setting(0.0)`，保证控制状态与在线调节走同一条路。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use dh_foundation::consts::MISSING;
use dh_physics::error::ErrorCode;
use dh_physics::objects::node::NodeKind;
use dh_physics::Project;

use crate::error::{IoError, IoResult};

/// 当前写出版本
const VERSION: u32 = 4;

/// 无版本号的初版魔数
const STAMP_V1: &[u8; 14] = b"SWMM5-HOTSTART";

/// 带版本号的魔数
const STAMP_V2: &[u8; 15] = b"SWMM5-HOTSTART2";
const STAMP_V3: &[u8; 15] = b"SWMM5-HOTSTART3";
const STAMP_V4: &[u8; 15] = b"SWMM5-HOTSTART4";

// ============================================================
// 读取
// ============================================================

/// 读取热启动文件并恢复项目状态
///
/// 失败时置位对应的粘性错误码并返回错误；已恢复的部分状态保留。
pub fn read(prj: &mut Project, path: &Path) -> IoResult<()> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            prj.set_error(ErrorCode::HotstartFileOpen, &path.display().to_string());
            return Err(IoError::Open {
                path: path.display().to_string(),
                source: e,
            });
        }
    };
    let mut r = BufReader::new(file);

    let version = match read_version(&mut r) {
        Some(v) => v,
        None => {
            prj.set_error(ErrorCode::HotstartFileFormat, &path.display().to_string());
            return Err(IoError::Format("热启动文件魔数不符".to_string()));
        }
    };

    // 目录规模与流量单位必须与当前项目一致
    let n_subcatch = if version >= 2 {
        read_i32(&mut r)?
    } else {
        prj.subcatchments.len() as i32
    };
    let n_landuse = if version >= 3 {
        read_i32(&mut r)?
    } else {
        prj.land_uses.len() as i32
    };
    let n_nodes = read_i32(&mut r)?;
    let n_links = read_i32(&mut r)?;
    let n_pollut = read_i32(&mut r)?;
    let flow_units = read_i32(&mut r)?;
    if n_subcatch != prj.subcatchments.len() as i32
        || n_landuse != prj.land_uses.len() as i32
        || n_nodes != prj.nodes.len() as i32
        || n_links != prj.links.len() as i32
        || n_pollut != prj.pollutants.len() as i32
        || flow_units != prj.units.flow_units().code()
    {
        prj.set_error(ErrorCode::HotstartFileFormat, &path.display().to_string());
        return Err(IoError::Format("热启动文件目录规模或流量单位不符".to_string()));
    }

    if version >= 3 {
        if let Err(e) = read_runoff(prj, &mut r) {
            prj.set_error(ErrorCode::HotstartFileRead, &path.display().to_string());
            return Err(e);
        }
    }
    if let Err(e) = read_routing(prj, &mut r, version) {
        prj.set_error(ErrorCode::HotstartFileRead, &path.display().to_string());
        return Err(e);
    }
    log::info!("热启动文件已加载: {} (版本 {})", path.display(), version);
    Ok(())
}

/// 识别魔数与版本；版本 1 魔数短一字节，需要回退文件指针
fn read_version(r: &mut BufReader<File>) -> Option<u32> {
    let mut stamp = [0u8; 15];
    if r.read_exact(&mut stamp).is_err() {
        return None;
    }
    if &stamp == STAMP_V4 {
        return Some(4);
    }
    if &stamp == STAMP_V3 {
        return Some(3);
    }
    if &stamp == STAMP_V2 {
        return Some(2);
    }
    if &stamp[..14] == STAMP_V1 {
        // 第 15 字节属于载荷，退回
        r.seek(SeekFrom::Start(14)).ok()?;
        return Some(1);
    }
    None
}

/// 恢复子汇水区产流状态（版本 ≥ 3）
fn read_runoff(prj: &mut Project, r: &mut impl Read) -> IoResult<()> {
    let n_pollut = prj.pollutants.len();
    let n_landuse = prj.land_uses.len();

    for i in 0..prj.subcatchments.len() {
        // 积水深与径流
        for j in 0..3 {
            prj.subcatchments[i].subareas[j].depth = read_f64(r)?;
        }
        prj.subcatchments[i].new_runoff = read_f64(r)?;

        // 入渗模型状态
        let mut x6 = [0.0; 6];
        for x in &mut x6 {
            *x = read_f64(r)?;
        }
        prj.subcatchments[i].infil.set_state_vec(x6);

        // 地下水状态
        if prj.subcatchments[i].groundwater.is_some() {
            let mut x4 = [0.0; 4];
            for x in &mut x4 {
                *x = read_f64(r)?;
            }
            if let Some(gw) = &mut prj.subcatchments[i].groundwater {
                gw.set_state_vec(x4);
            }
        }

        // 积雪状态
        if prj.subcatchments[i].snowpack.is_some() {
            for s in 0..3 {
                let mut x5 = [0.0; 5];
                for x in &mut x5 {
                    *x = read_f64(r)?;
                }
                if let Some(snow) = &mut prj.subcatchments[i].snowpack {
                    snow.set_state_vec(s, x5);
                }
            }
        }

        // 水质状态
        if n_pollut > 0 {
            for p in 0..n_pollut {
                prj.subcatchments[i].new_qual[p] = read_f64(r)?;
            }
            for p in 0..n_pollut {
                prj.subcatchments[i].ponded_qual[p] = read_f64(r)?;
            }
            for k in 0..n_landuse {
                for p in 0..n_pollut {
                    prj.subcatchments[i].land_factors[k].buildup[p] = read_f64(r)?;
                }
                prj.subcatchments[i].land_factors[k].last_swept = read_f64(r)?;
            }
        }
    }
    Ok(())
}

/// 恢复节点与管段演算状态
fn read_routing(prj: &mut Project, r: &mut impl Read, version: u32) -> IoResult<()> {
    let n_pollut = prj.pollutants.len();

    // 版本 2 在演算载荷前带每个子汇水区的地下水浮点对
    if version == 2 {
        for i in 0..prj.subcatchments.len() {
            let theta = read_f32(r)? as f64;
            let elev = read_f32(r)? as f64;
            if let Some(gw) = &mut prj.subcatchments[i].groundwater {
                gw.set_state_vec([theta, elev, 0.0, MISSING]);
            }
        }
    }

    for i in 0..prj.nodes.len() {
        prj.nodes[i].new_depth = read_f32(r)? as f64;
        prj.nodes[i].new_lat_flow = read_f32(r)? as f64;

        if version >= 4 && prj.nodes[i].is_storage() {
            let hrt = read_f32(r)? as f64;
            if let NodeKind::Storage(s) = &mut prj.nodes[i].kind {
                s.hrt = hrt;
            }
        }

        for p in 0..n_pollut {
            prj.nodes[i].new_qual[p] = read_f32(r)? as f64;
        }

        // 历史版本的补零字段，读取后丢弃
        if version <= 2 {
            for _ in 0..n_pollut {
                read_f32(r)?;
            }
        }
    }

    for i in 0..prj.links.len() {
        prj.links[i].new_flow = read_f32(r)? as f64;
        prj.links[i].new_depth = read_f32(r)? as f64;
        let setting = read_f32(r)? as f64;

        // 开度经由控制路径重放
        prj.links[i].set_target_setting(setting);
        prj.links[i].set_setting(0.0);

        for p in 0..n_pollut {
            prj.links[i].new_qual[p] = read_f32(r)? as f64;
        }
    }
    Ok(())
}

// ============================================================
// 保存
// ============================================================

/// 把当前项目状态保存为版本 4 热启动文件
pub fn save(prj: &mut Project, path: &Path) -> IoResult<()> {
    let file = match File::create(path) {
        Ok(f) => f,
        Err(e) => {
            prj.set_error(ErrorCode::HotstartFileOpen, &path.display().to_string());
            return Err(IoError::Open {
                path: path.display().to_string(),
                source: e,
            });
        }
    };
    let mut w = BufWriter::new(file);

    w.write_all(STAMP_V4)?;
    write_i32(&mut w, prj.subcatchments.len() as i32)?;
    write_i32(&mut w, prj.land_uses.len() as i32)?;
    write_i32(&mut w, prj.nodes.len() as i32)?;
    write_i32(&mut w, prj.links.len() as i32)?;
    write_i32(&mut w, prj.pollutants.len() as i32)?;
    write_i32(&mut w, prj.units.flow_units().code())?;

    save_runoff(prj, &mut w)?;
    save_routing(prj, &mut w)?;
    w.flush()?;
    log::info!("热启动文件已保存: {} (版本 {})", path.display(), VERSION);
    Ok(())
}

fn save_runoff(prj: &Project, w: &mut impl Write) -> IoResult<()> {
    let n_pollut = prj.pollutants.len();
    for sc in &prj.subcatchments {
        for sa in &sc.subareas {
            write_f64(w, sa.depth)?;
        }
        write_f64(w, sc.new_runoff)?;

        for x in sc.infil.state_vec() {
            write_f64(w, x)?;
        }
        if let Some(gw) = &sc.groundwater {
            for x in gw.state_vec() {
                write_f64(w, x)?;
            }
        }
        if let Some(snow) = &sc.snowpack {
            for s in 0..3 {
                for x in snow.state_vec(s) {
                    write_f64(w, x)?;
                }
            }
        }
        if n_pollut > 0 {
            for p in 0..n_pollut {
                write_f64(w, sc.new_qual[p])?;
            }
            for p in 0..n_pollut {
                write_f64(w, sc.ponded_qual[p])?;
            }
            for lf in &sc.land_factors {
                for p in 0..n_pollut {
                    write_f64(w, lf.buildup[p])?;
                }
                write_f64(w, lf.last_swept)?;
            }
        }
    }
    Ok(())
}

fn save_routing(prj: &Project, w: &mut impl Write) -> IoResult<()> {
    let n_pollut = prj.pollutants.len();
    for node in &prj.nodes {
        write_f32(w, node.new_depth as f32)?;
        write_f32(w, node.new_lat_flow as f32)?;
        if let NodeKind::Storage(s) = &node.kind {
            write_f32(w, s.hrt as f32)?;
        }
        for p in 0..n_pollut {
            write_f32(w, node.new_qual[p] as f32)?;
        }
    }
    for link in &prj.links {
        write_f32(w, link.new_flow as f32)?;
        write_f32(w, link.new_depth as f32)?;
        write_f32(w, link.setting as f32)?;
        for p in 0..n_pollut {
            write_f32(w, link.new_qual[p] as f32)?;
        }
    }
    Ok(())
}

// ============================================================
// 标量读写
// ============================================================

fn read_i32(r: &mut impl Read) -> IoResult<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| IoError::Read("热启动文件截断".to_string()))?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(r: &mut impl Read) -> IoResult<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| IoError::Read("热启动文件截断".to_string()))?;
    let x = f32::from_le_bytes(buf);
    if x.is_nan() {
        return Err(IoError::Read("热启动文件含 NaN".to_string()));
    }
    Ok(x)
}

fn read_f64(r: &mut impl Read) -> IoResult<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|_| IoError::Read("热启动文件截断".to_string()))?;
    let x = f64::from_le_bytes(buf);
    if x.is_nan() {
        return Err(IoError::Read("热启动文件含 NaN".to_string()));
    }
    Ok(x)
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

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dh_config::ProjectConfig;

    fn build_project() -> Project {
        let cfg = ProjectConfig::from_json(
            &serde_json::json!({
                "options": {
                    "start_date": "2023-06-01T00:00:00",
                    "end_date": "2023-06-02T00:00:00"
                },
                "gages": [
                    {"name": "G1", "series": [[0.0, 0.5]], "interval": 2.0}
                ],
                "pollutants": [
                    {"name": "TSS"}
                ],
                "land_uses": [
                    {"name": "Residential"}
                ],
                "subcatchments": [
                    {
                        "name": "S1", "gage": "G1",
                        "outlet": {"node": "T1"},
                        "area": 2.0, "pct_imperv": 40.0,
                        "width": 200.0, "slope": 0.5,
                        "infiltration": {"constant": {"capacity": 0.3}},
                        "groundwater": {
                            "bottom_elev": 90.0, "water_table": 95.0,
                            "theta": 0.2, "max_infil_rate": 0.5
                        },
                        "snowpack": true
                    }
                ],
                "nodes": [
                    {"name": "T1", "type": "storage", "invert_elev": 100.0,
                     "max_depth": 10.0,
                     "curve": {"functional": {"coeff": 0.0, "exponent": 0.0, "constant": 500.0}}},
                    {"name": "O1", "type": "outfall", "invert_elev": 95.0}
                ],
                "links": [
                    {"name": "R1", "from": "T1", "to": "O1", "type": "outlet",
                     "coeff": 2.0, "exponent": 1.0}
                ]
            })
            .to_string(),
        )
        .unwrap();
        Project::from_config(&cfg).unwrap()
    }

    fn dirty_state(prj: &mut Project) {
        let sc = &mut prj.subcatchments[0];
        sc.subareas[0].depth = 0.011;
        sc.subareas[1].depth = 0.022;
        sc.subareas[2].depth = 0.033;
        sc.new_runoff = 1.25;
        sc.infil.set_state_vec([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        if let Some(gw) = &mut sc.groundwater {
            gw.theta = 0.31;
            gw.new_flow = 2.5e-7;
            gw.max_infil_vol = 0.015;
        }
        if let Some(snow) = &mut sc.snowpack {
            snow.surfaces[1] = [0.08, 0.01, 0.0, 30.0, 1.0];
        }
        sc.new_qual[0] = 42.0;
        sc.ponded_qual[0] = 7.0;
        sc.land_factors[0].buildup[0] = 12.5;
        sc.land_factors[0].last_swept = 150.0;

        prj.nodes[0].new_depth = 3.5;
        prj.nodes[0].new_lat_flow = 0.75;
        if let NodeKind::Storage(s) = &mut prj.nodes[0].kind {
            s.hrt = 1800.0;
        }
        prj.nodes[0].new_qual[0] = 5.0;
        prj.nodes[1].new_depth = 0.4;
        prj.nodes[1].new_qual[0] = 3.0;

        prj.links[0].new_flow = 6.0;
        prj.links[0].new_depth = 1.1;
        prj.links[0].setting = 0.6;
        prj.links[0].target_setting = 0.6;
        prj.links[0].new_qual[0] = 4.0;
    }

    #[test]
    fn test_roundtrip_restores_all_fields() {
        let path = std::env::temp_dir().join("dh_hotstart_roundtrip.hsf");
        let mut prj = build_project();
        dirty_state(&mut prj);
        save(&mut prj, &path).unwrap();

        let mut other = build_project();
        read(&mut other, &path).unwrap();

        let sc = &other.subcatchments[0];
        assert_eq!(sc.subareas[0].depth, 0.011);
        assert_eq!(sc.subareas[2].depth, 0.033);
        assert_eq!(sc.new_runoff, 1.25);
        assert_eq!(sc.infil.state_vec(), [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let gw = sc.groundwater.as_ref().unwrap();
        assert_eq!(gw.theta, 0.31);
        assert_eq!(gw.new_flow, 2.5e-7);
        assert_eq!(gw.max_infil_vol, 0.015);
        let snow = sc.snowpack.as_ref().unwrap();
        assert_eq!(snow.surfaces[1], [0.08, 0.01, 0.0, 30.0, 1.0]);
        assert_eq!(sc.new_qual[0], 42.0);
        assert_eq!(sc.ponded_qual[0], 7.0);
        assert_eq!(sc.land_factors[0].buildup[0], 12.5);
        assert_eq!(sc.land_factors[0].last_swept, 150.0);

        // 演算状态按 f32 精度恢复
        assert_eq!(other.nodes[0].new_depth, 3.5f32 as f64);
        assert_eq!(other.nodes[0].new_lat_flow, 0.75f32 as f64);
        if let NodeKind::Storage(s) = &other.nodes[0].kind {
            assert_eq!(s.hrt, 1800.0f32 as f64);
        } else {
            panic!("应为调蓄节点");
        }
        assert_eq!(other.links[0].new_flow, 6.0f32 as f64);
        assert_eq!(other.links[0].new_depth, 1.1f32 as f64);
        // 开度经由控制路径恢复：setting 与 target 一致
        assert_eq!(other.links[0].setting, 0.6f32 as f64);
        assert_eq!(other.links[0].target_setting, other.links[0].setting);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_catalog_mismatch_rejected() {
        let path = std::env::temp_dir().join("dh_hotstart_mismatch.hsf");
        let mut prj = build_project();
        save(&mut prj, &path).unwrap();

        // 去掉污染物后目录规模不符
        let cfg = ProjectConfig::from_json(
            &serde_json::json!({
                "options": {
                    "start_date": "2023-06-01T00:00:00",
                    "end_date": "2023-06-02T00:00:00"
                },
                "nodes": [
                    {"name": "O1", "type": "outfall", "invert_elev": 95.0}
                ]
            })
            .to_string(),
        )
        .unwrap();
        let mut other = Project::from_config(&cfg).unwrap();
        let result = read(&mut other, &path);
        assert!(matches!(result, Err(IoError::Format(_))));
        assert_eq!(other.error_code, Some(ErrorCode::HotstartFileFormat));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let path = std::env::temp_dir().join("dh_hotstart_badmagic.hsf");
        std::fs::write(&path, b"NOT-A-HOTSTART-FILE").unwrap();
        let mut prj = build_project();
        let result = read(&mut prj, &path);
        assert!(matches!(result, Err(IoError::Format(_))));
        assert_eq!(prj.error_code, Some(ErrorCode::HotstartFileFormat));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_nan_aborts_read() {
        let path = std::env::temp_dir().join("dh_hotstart_nan.hsf");
        let mut prj = build_project();
        dirty_state(&mut prj);
        save(&mut prj, &path).unwrap();

        // 把产流载荷的第一个 f64（子面积积水深）改写为 NaN
        let mut bytes = std::fs::read(&path).unwrap();
        let offset = 15 + 6 * 4;
        bytes[offset..offset + 8].copy_from_slice(&f64::NAN.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let mut other = build_project();
        let result = read(&mut other, &path);
        assert!(matches!(result, Err(IoError::Read(_))));
        assert_eq!(other.error_code, Some(ErrorCode::HotstartFileRead));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_sets_open_code() {
        let mut prj = build_project();
        let result = read(&mut prj, Path::new("/nonexistent/dh.hsf"));
        assert!(matches!(result, Err(IoError::Open { .. })));
        assert_eq!(prj.error_code, Some(ErrorCode::HotstartFileOpen));
    }

    #[test]
    fn test_v3_file_read_without_hrt() {
        // 手工构造版本 3 文件：与 v4 相同但无调蓄 HRT 字段
        let path = std::env::temp_dir().join("dh_hotstart_v3.hsf");
        let mut prj = build_project();
        dirty_state(&mut prj);

        let file = File::create(&path).unwrap();
        let mut w = BufWriter::new(file);
        w.write_all(STAMP_V3).unwrap();
        for n in [
            prj.subcatchments.len(),
            prj.land_uses.len(),
            prj.nodes.len(),
            prj.links.len(),
            prj.pollutants.len(),
        ] {
            write_i32(&mut w, n as i32).unwrap();
        }
        write_i32(&mut w, prj.units.flow_units().code()).unwrap();
        save_runoff(&prj, &mut w).unwrap();
        // v3 演算载荷：节点无 HRT
        for node in &prj.nodes {
            write_f32(&mut w, node.new_depth as f32).unwrap();
            write_f32(&mut w, node.new_lat_flow as f32).unwrap();
            for p in 0..prj.pollutants.len() {
                write_f32(&mut w, node.new_qual[p] as f32).unwrap();
            }
        }
        for link in &prj.links {
            write_f32(&mut w, link.new_flow as f32).unwrap();
            write_f32(&mut w, link.new_depth as f32).unwrap();
            write_f32(&mut w, link.setting as f32).unwrap();
            for p in 0..prj.pollutants.len() {
                write_f32(&mut w, link.new_qual[p] as f32).unwrap();
            }
        }
        w.flush().unwrap();
        drop(w);

        let mut other = build_project();
        read(&mut other, &path).unwrap();
        assert_eq!(other.nodes[0].new_depth, 3.5f32 as f64);
        // v3 没有 HRT，保持初始零
        if let NodeKind::Storage(s) = &other.nodes[0].kind {
            assert_eq!(s.hrt, 0.0);
        }
        let _ = std::fs::remove_file(&path);
    }
}
