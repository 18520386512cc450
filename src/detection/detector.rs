//! 检测器 (Detector)
//! 职责: 采样图像 → Letterbox → ONNX 推理 → 解码 + NMS → Vec<Detection>

use std::path::Path;
use std::time::Instant;

use image::RgbImage;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use thiserror::Error;

use super::labels::LabelMap;
use super::letterbox::{normalize, Letterbox};
use super::postprocess::{decode, non_max_suppression};
use super::types::Detection;

/// 默认网络输入尺寸
pub const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("模型加载失败 {path}: {message}")]
    ModelLoad { path: String, message: String },
    #[error("标签文件读取失败 {path}: {source}")]
    Labels {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("推理失败: {0}")]
    Inference(String),
}

/// 检测器接口 (采集线程只依赖此接口)
pub trait ObjectDetector: Send {
    fn is_loaded(&self) -> bool;

    /// 动态尺寸模型的输入分辨率
    fn set_input_resolution(&mut self, size: u32);

    fn detect(&mut self, image: &RgbImage, conf_threshold: f32, nms_threshold: f32)
        -> Vec<Detection>;
}

pub struct Detector {
    session: Option<Session>,
    input_name: String,
    output_name: String,
    input_width: u32,
    input_height: u32,
    /// 模型声明了固定输入尺寸
    fixed_input: bool,
    labels: LabelMap,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    pub fn new() -> Self {
        Self {
            session: None,
            input_name: String::from("images"),
            output_name: String::from("output0"),
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            fixed_input: false,
            labels: LabelMap::default(),
        }
    }

    /// 加载 ONNX 模型
    ///
    /// 失败时旧会话被释放, 检测保持禁用直到下次加载成功
    pub fn load_model(
        &mut self,
        path: impl AsRef<Path>,
        use_gpu: bool,
        threads: usize,
    ) -> Result<(), DetectorError> {
        let path = path.as_ref();
        self.session = None;
        self.fixed_input = false;

        let err = |message: String| DetectorError::ModelLoad {
            path: path.display().to_string(),
            message,
        };

        let mut builder = Session::builder()
            .map_err(|e| err(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| err(e.to_string()))?
            .with_intra_threads(threads.max(1))
            .map_err(|e| err(e.to_string()))?
            .with_inter_threads(1)
            .map_err(|e| err(e.to_string()))?;

        if use_gpu {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| err(e.to_string()))?;
        }

        let session = builder
            .commit_from_file(path)
            .map_err(|e| err(e.to_string()))?;

        let Some(input) = session.inputs.first() else {
            return Err(err(String::from("模型没有输入")));
        };
        let Some(output) = session.outputs.first() else {
            return Err(err(String::from("模型没有输出")));
        };
        self.input_name = input.name.clone();
        self.output_name = output.name.clone();

        // 固定尺寸模型 [N, C, H, W]: 强制使用模型声明的分辨率
        if let Some(shape) = input.input_type.tensor_shape() {
            if shape.len() == 4 && shape[2] > 0 && shape[3] > 0 {
                self.input_height = shape[2] as u32;
                self.input_width = shape[3] as u32;
                self.fixed_input = true;
            }
        }

        tracing::info!(
            "✅ 模型加载成功: {} (输入: {} {}x{}{}, GPU: {})",
            path.display(),
            self.input_name,
            self.input_width,
            self.input_height,
            if self.fixed_input { " 固定" } else { "" },
            use_gpu
        );
        self.session = Some(session);
        Ok(())
    }

    /// 加载类别名称, 返回解析到的条目数
    pub fn load_labels(&mut self, path: impl AsRef<Path>) -> Result<usize, DetectorError> {
        let path = path.as_ref();
        let labels = LabelMap::load(path).map_err(|source| DetectorError::Labels {
            path: path.display().to_string(),
            source,
        })?;
        if labels.is_empty() {
            tracing::warn!("⚠️ 标签文件没有可用条目: {}", path.display());
        }
        self.labels = labels;
        Ok(self.labels.len())
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// 设置动态尺寸模型的输入分辨率 (固定尺寸模型忽略)
    pub fn set_input_resolution(&mut self, size: u32) {
        if self.fixed_input {
            return;
        }
        let size = size.max(32);
        self.input_width = size;
        self.input_height = size;
    }

    /// 模型声明的固定输入尺寸 (宽, 高)
    pub fn fixed_resolution(&self) -> Option<(u32, u32)> {
        self.fixed_input
            .then_some((self.input_width, self.input_height))
    }

    pub fn input_resolution(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    pub fn label(&self, class_id: usize) -> String {
        self.labels.label(class_id)
    }

    /// 单帧检测
    ///
    /// 未加载模型返回空; 推理错误只记录日志, 不向上传播
    pub fn detect(
        &mut self,
        image: &RgbImage,
        conf_threshold: f32,
        nms_threshold: f32,
    ) -> Vec<Detection> {
        if self.session.is_none() {
            return Vec::new();
        }

        match self.try_detect(image, conf_threshold, nms_threshold) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::error!("❌ {}", e);
                Vec::new()
            }
        }
    }

    fn try_detect(
        &mut self,
        image: &RgbImage,
        conf_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<Detection>, DetectorError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(Vec::new());
        };

        // 1. 预处理
        let t = Instant::now();
        let (w, h) = image.dimensions();
        let letterbox = Letterbox::fit(w, h, self.input_width, self.input_height);
        let input = normalize(&letterbox.apply(image));
        let preprocess_ms = t.elapsed().as_secs_f64() * 1000.0;

        // 2. 推理
        let t = Instant::now();
        let tensor = Tensor::from_array(input).map_err(|e| DetectorError::Inference(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        let inference_ms = t.elapsed().as_secs_f64() * 1000.0;

        // 3. 后处理
        let mut candidates = decode(output, &letterbox, conf_threshold);
        non_max_suppression(&mut candidates, nms_threshold);

        tracing::debug!(
            "🔍 检测: {}个 (预处理:{:.1}ms | 推理:{:.1}ms)",
            candidates.len(),
            preprocess_ms,
            inference_ms
        );

        Ok(candidates
            .into_iter()
            .map(|c| Detection::new(c.rect, c.confidence, c.class_id, self.labels.label(c.class_id)))
            .collect())
    }
}

impl ObjectDetector for Detector {
    fn is_loaded(&self) -> bool {
        Detector::is_loaded(self)
    }

    fn set_input_resolution(&mut self, size: u32) {
        Detector::set_input_resolution(self, size)
    }

    fn detect(&mut self, image: &RgbImage, conf_threshold: f32, nms_threshold: f32) -> Vec<Detection> {
        Detector::detect(self, image, conf_threshold, nms_threshold)
    }
}
