// crates/dh_io/src/iface.rs

//! 产流接口文件
//!
//! 把逐步产流结果存成二进制文件，后续运行可直接读取替代产流
//! 计算。布局（全部小端）：
//!
//! ```text
//! [魔数: "SWMM5-RUNOFF"]
//! [i32 × 4: nSubcatch, nPollut, flowUnits, 步数（写出时回填）]
//! 每个记录步：
//!   [f32: 步长 s]
//!   [f32 × nSubcatch × (MAX_SUBCATCH_RESULTS + nPollut − 1)]（用户单位）
//! ```
//!
//! 读取模式下每步用一条记录替换全部子汇水区动态状态（从用户
//! 单位换算回内部单位）；保存模式下逐步追加，关闭时把实际步数
//! 回填到预留槽位。

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use dh_foundation::units::Quantity;
use dh_physics::error::ErrorCode;
use dh_physics::objects::subcatch::result_index;
use dh_physics::runoff::RunoffIface;
use dh_physics::{IfaceMode, Project};

use crate::error::{IoError, IoResult};
use crate::results::MAX_SUBCATCH_RESULTS;

/// 接口文件魔数
const STAMP: &[u8; 12] = b"SWMM5-RUNOFF";

/// 产流接口文件
pub struct RunoffIfaceFile {
    file: File,
    mode: IfaceMode,
    /// 文件记录的总步数（读取模式）
    max_steps: i32,
    /// 步数槽位偏移（保存模式回填用）
    max_steps_pos: u64,
    /// 已读步数
    steps_read: i32,
    /// 结果缓冲
    buf: Vec<f32>,
}

impl RunoffIfaceFile {
    /// 打开接口文件
    ///
    /// 保存模式写出头部并预留步数槽位；读取模式校验头部与目录
    /// 规模。失败时置位粘性错误码。
    pub fn open(prj: &mut Project, path: &Path, mode: IfaceMode) -> IoResult<Self> {
        let n_results = MAX_SUBCATCH_RESULTS + prj.pollutants.len() - 1;
        let file = match mode {
            IfaceMode::Save => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path),
            _ => File::open(path),
        };
        let file = match file {
            Ok(f) => f,
            Err(e) => {
                prj.set_error(ErrorCode::RunoffFileOpen, &path.display().to_string());
                return Err(IoError::Open {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        let mut iface = Self {
            file,
            mode,
            max_steps: 0,
            max_steps_pos: 0,
            steps_read: 0,
            buf: vec![0.0; n_results],
        };

        match mode {
            IfaceMode::Save => {
                if let Err(e) = iface.write_header(prj) {
                    prj.set_error(ErrorCode::RunoffFileOpen, &path.display().to_string());
                    return Err(e);
                }
            }
            IfaceMode::Use => {
                if let Err(e) = iface.check_header(prj) {
                    prj.set_error(ErrorCode::RunoffFileFormat, &path.display().to_string());
                    return Err(e);
                }
            }
            IfaceMode::None => {}
        }
        Ok(iface)
    }

    /// 关闭：保存模式把实际步数回填到预留槽位
    pub fn close(&mut self, prj: &mut Project) {
        if self.mode == IfaceMode::Save {
            let nsteps = prj.runoff_flags.nsteps as i32;
            let result: IoResult<()> = (|| {
                self.file.seek(SeekFrom::Start(self.max_steps_pos))?;
                self.file.write_all(&nsteps.to_le_bytes())?;
                self.file.flush()?;
                Ok(())
            })();
            if result.is_err() {
                prj.set_error(ErrorCode::RunoffFileRead, "产流接口文件步数回填失败");
            }
        }
    }

    fn write_header(&mut self, prj: &Project) -> IoResult<()> {
        self.file.write_all(STAMP)?;
        for n in [
            prj.subcatchments.len() as i32,
            prj.pollutants.len() as i32,
            prj.units.flow_units().code(),
        ] {
            self.file.write_all(&n.to_le_bytes())?;
        }
        self.max_steps_pos = self.file.stream_position()?;
        self.file.write_all(&0i32.to_le_bytes())?;
        Ok(())
    }

    fn check_header(&mut self, prj: &Project) -> IoResult<()> {
        let mut stamp = [0u8; 12];
        self.file
            .read_exact(&mut stamp)
            .map_err(|_| IoError::Format("产流接口文件魔数缺失".to_string()))?;
        if &stamp != STAMP {
            return Err(IoError::Format("产流接口文件魔数不符".to_string()));
        }
        let n_subcatch = read_i32(&mut self.file)?;
        let n_pollut = read_i32(&mut self.file)?;
        let flow_units = read_i32(&mut self.file)?;
        self.max_steps = read_i32(&mut self.file)?;
        if n_subcatch != prj.subcatchments.len() as i32
            || n_pollut != prj.pollutants.len() as i32
            || flow_units != prj.units.flow_units().code()
            || self.max_steps <= 0
        {
            return Err(IoError::Format(
                "产流接口文件目录规模或流量单位不符".to_string(),
            ));
        }
        Ok(())
    }
}

impl RunoffIface for RunoffIfaceFile {
    /// 读一条记录并替换全部子汇水区动态状态
    fn read_step(&mut self, prj: &mut Project) -> Result<f64, ()> {
        // 记录耗尽
        if self.steps_read >= self.max_steps {
            prj.set_error(ErrorCode::RunoffFileEnd, "产流接口文件记录耗尽");
            return Err(());
        }

        let mut tstep_buf = [0u8; 4];
        if self.file.read_exact(&mut tstep_buf).is_err() {
            prj.set_error(ErrorCode::RunoffFileRead, "产流接口文件读取失败");
            return Err(());
        }
        let tstep = f32::from_le_bytes(tstep_buf) as f64;

        let units = prj.units;
        let ucf_depth = units.ucf(Quantity::RainDepth);
        let ucf_rain = units.ucf(Quantity::Rainfall);
        let ucf_evap = units.ucf(Quantity::EvapRate);
        let ucf_flow = units.ucf(Quantity::Flow);
        let ucf_len = units.ucf(Quantity::Length);
        let n_pollut = prj.pollutants.len();

        for j in 0..prj.subcatchments.len() {
            if read_f32_slice(&mut self.file, &mut self.buf).is_err() {
                prj.set_error(ErrorCode::RunoffFileRead, "产流接口文件读取失败");
                return Err(());
            }
            // 结果按用户单位保存，换算回内部单位
            let sc = &mut prj.subcatchments[j];
            sc.new_snow_depth = self.buf[result_index::SNOWDEPTH] as f64 / ucf_depth;
            sc.evap_loss = self.buf[result_index::EVAP] as f64 / ucf_evap;
            sc.infil_loss = self.buf[result_index::INFIL] as f64 / ucf_rain;
            sc.new_runoff = self.buf[result_index::RUNOFF] as f64 / ucf_flow;

            let area = sc.area;
            if let Some(gw) = &mut sc.groundwater {
                gw.new_flow = if area > 0.0 {
                    self.buf[result_index::GW_FLOW] as f64 / ucf_flow / area
                } else {
                    0.0
                };
                let elev = self.buf[result_index::GW_ELEV] as f64 / ucf_len;
                gw.lower_depth = (elev - gw.bottom_elev).max(0.0);
                gw.theta = self.buf[result_index::SOIL_MOIST] as f64;
            }
            for p in 0..n_pollut {
                sc.new_qual[p] = self.buf[result_index::WASHOFF + p] as f64;
            }
        }
        self.steps_read += 1;
        Ok(tstep)
    }

    /// 追加一条当前步的记录
    fn save_step(&mut self, prj: &mut Project, tstep: f64) {
        let units = prj.units;
        for gage in &mut prj.gages {
            gage.set_report_rainfall(&units);
        }
        let result: IoResult<()> = (|| {
            self.file.write_all(&(tstep as f32).to_le_bytes())?;
            for j in 0..prj.subcatchments.len() {
                let report_rain = prj.subcatchments[j]
                    .gage
                    .map_or(0.0, |g| prj.gages[g].report_rainfall);
                prj.subcatchments[j].get_results(1.0, report_rain, &units, &mut self.buf);
                for &x in &self.buf {
                    self.file.write_all(&x.to_le_bytes())?;
                }
            }
            Ok(())
        })();
        if result.is_err() {
            prj.set_error(ErrorCode::RunoffFileRead, "产流接口文件写出失败");
        }
    }
}

fn read_i32(r: &mut impl Read) -> IoResult<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| IoError::Read("产流接口文件截断".to_string()))?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32_slice(r: &mut impl Read, out: &mut [f32]) -> std::io::Result<()> {
    let mut buf = [0u8; 4];
    for x in out.iter_mut() {
        r.read_exact(&mut buf)?;
        *x = f32::from_le_bytes(buf);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dh_config::ProjectConfig;

    fn build_project() -> Project {
        let cfg = ProjectConfig::from_json(
            &serde_json::json!({
                "options": {
                    "start_date": "2023-06-01T00:00:00",
                    "end_date": "2023-06-01T06:00:00"
                },
                "gages": [
                    {"name": "G1", "series": [[0.0, 0.5]], "interval": 6.0}
                ],
                "pollutants": [
                    {"name": "TSS"}
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
                    {"name": "O1", "type": "outfall", "invert_elev": 100.0}
                ]
            })
            .to_string(),
        )
        .unwrap();
        Project::from_config(&cfg).unwrap()
    }

    #[test]
    fn test_save_then_use_roundtrip() {
        let path = std::env::temp_dir().join("dh_iface_roundtrip.rif");
        let mut prj = build_project();
        {
            let mut iface =
                RunoffIfaceFile::open(&mut prj, &path, IfaceMode::Save).unwrap();
            // 伪造两步产流状态
            prj.subcatchments[0].new_runoff = 2.5;
            prj.subcatchments[0].old_runoff = 2.5;
            prj.subcatchments[0].new_snow_depth = 0.02;
            prj.subcatchments[0].old_snow_depth = 0.02;
            prj.subcatchments[0].evap_loss = 1.0e-7;
            prj.subcatchments[0].infil_loss = 2.0e-7;
            prj.subcatchments[0].new_qual[0] = 33.0;
            prj.subcatchments[0].old_qual[0] = 33.0;
            prj.runoff_flags.nsteps = 1;
            iface.save_step(&mut prj, 300.0);
            prj.runoff_flags.nsteps = 2;
            iface.save_step(&mut prj, 300.0);
            iface.close(&mut prj);
        }

        let mut other = build_project();
        let mut iface = RunoffIfaceFile::open(&mut other, &path, IfaceMode::Use).unwrap();
        assert_eq!(iface.max_steps, 2);
        let tstep = iface.read_step(&mut other).unwrap();
        assert!((tstep - 300.0).abs() < 1e-6);

        // f32 与单位换算往返精度内恢复
        let sc = &other.subcatchments[0];
        assert!((sc.new_runoff - 2.5).abs() < 1e-6);
        assert!((sc.new_snow_depth - 0.02).abs() < 1e-7);
        assert!((sc.evap_loss - 1.0e-7).abs() < 1e-12);
        assert!((sc.infil_loss - 2.0e-7).abs() < 1e-12);
        assert!((sc.new_qual[0] - 33.0).abs() < 1e-5);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_use_exhausted_sets_end_code() {
        let path = std::env::temp_dir().join("dh_iface_end.rif");
        let mut prj = build_project();
        {
            let mut iface =
                RunoffIfaceFile::open(&mut prj, &path, IfaceMode::Save).unwrap();
            prj.runoff_flags.nsteps = 1;
            iface.save_step(&mut prj, 300.0);
            iface.close(&mut prj);
        }
        let mut other = build_project();
        let mut iface = RunoffIfaceFile::open(&mut other, &path, IfaceMode::Use).unwrap();
        iface.read_step(&mut other).unwrap();
        assert!(iface.read_step(&mut other).is_err());
        assert_eq!(other.error_code, Some(ErrorCode::RunoffFileEnd));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_use_rejects_mismatched_catalog() {
        let path = std::env::temp_dir().join("dh_iface_mismatch.rif");
        let mut prj = build_project();
        {
            let mut iface =
                RunoffIfaceFile::open(&mut prj, &path, IfaceMode::Save).unwrap();
            prj.runoff_flags.nsteps = 1;
            iface.save_step(&mut prj, 300.0);
            iface.close(&mut prj);
        }
        // 无污染物的项目：目录规模不符
        let cfg = ProjectConfig::from_json(
            &serde_json::json!({
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
                    {"name": "O1", "type": "outfall", "invert_elev": 100.0}
                ]
            })
            .to_string(),
        )
        .unwrap();
        let mut other = Project::from_config(&cfg).unwrap();
        let result = RunoffIfaceFile::open(&mut other, &path, IfaceMode::Use);
        assert!(result.is_err());
        assert_eq!(other.error_code, Some(ErrorCode::RunoffFileFormat));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_sets_open_code() {
        let mut prj = build_project();
        let result =
            RunoffIfaceFile::open(&mut prj, Path::new("/nonexistent/dh.rif"), IfaceMode::Use);
        assert!(result.is_err());
        assert_eq!(prj.error_code, Some(ErrorCode::RunoffFileOpen));
    }
}
