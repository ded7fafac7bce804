//! 形態分類用CNNの定義
//!
//! アーキテクチャは `architecture.json`（burnの `Config`）として保存され、
//! 重みは `weights.bin` から復元されます。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, LinearRecord, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::error::ClassifyError;

/// 畳み込みカーネルの一辺
const KERNEL_SIZE: usize = 3;

/// ネットワーク構成（architecture.json）
#[derive(Config, Debug)]
pub struct MorphologyNetConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 170)]
    pub image_size: usize,
    /// 各畳み込みブロックの出力チャネル数
    #[config(default = "vec![32, 64, 128]")]
    pub channels: Vec<usize>,
    /// 全結合の中間次元
    #[config(default = 256)]
    pub hidden_size: usize,
    /// ドロップアウト率（推論時は無効）
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl MorphologyNetConfig {
    /// 畳み込みブロック通過後の特徴マップの一辺
    ///
    /// 1ブロックで 3x3 Conv（padding無し）により2減少し、2x2 Poolで半分（切り捨て）になる。
    pub fn feature_map_size(&self) -> usize {
        self.channels
            .iter()
            .fold(self.image_size, |size, _| size.saturating_sub(KERNEL_SIZE - 1) / 2)
    }

    /// Flatten後の特徴次元（特徴マップが潰れる構成では None）
    pub fn feature_dim(&self) -> Option<usize> {
        let size = self.feature_map_size();
        let channels = *self.channels.last()?;
        if size == 0 || channels == 0 {
            return None;
        }
        Some(channels * size * size)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<MorphologyNet<B>, ClassifyError> {
        let d = self.feature_dim().ok_or_else(|| {
            ClassifyError::WeightMismatch(format!(
                "input size {} is too small for {} conv blocks",
                self.image_size,
                self.channels.len()
            ))
        })?;

        let mut in_channels = 3;
        let mut convs = Vec::with_capacity(self.channels.len());
        for &out_channels in &self.channels {
            convs.push(
                Conv2dConfig::new([in_channels, out_channels], [KERNEL_SIZE, KERNEL_SIZE])
                    .with_stride([1, 1])
                    .init(device),
            );
            in_channels = out_channels;
        }

        Ok(MorphologyNet {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(d, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        })
    }
}

/// 形態分類用CNN
///
/// # アーキテクチャ
/// - {Conv 3x3 (no padding) + ReLU + MaxPool 2x2} x N
/// - Flatten
/// - FC: d -> hidden + ReLU + Dropout
/// - FC: hidden -> num_classes
/// - Softmax (推論時)
#[derive(Module, Debug)]
pub struct MorphologyNet<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    dropout: Dropout,
    activation: Relu,
}

impl<B: Backend> MorphologyNet<B> {
    /// 順伝播
    ///
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    /// - 戻り値: クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for conv in &self.convs {
            x = conv.forward(x);
            x = self.activation.forward(x);
            x = self.pool.forward(x);
        }

        let [batch_size, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// クラス確率 [batch_size, num_classes]
    pub fn predict_proba(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

impl<B: Backend> MorphologyNetRecord<B> {
    /// 重みの形状が構成どおりか確認
    ///
    /// モデルへ読み込む前に、レコードの段階で層数と各パラメータの形状を照合します。
    pub fn verify_shapes(&self, config: &MorphologyNetConfig) -> Result<(), String> {
        if self.convs.len() != config.channels.len() {
            return Err(format!(
                "{} conv layers in weights, architecture has {}",
                self.convs.len(),
                config.channels.len()
            ));
        }

        let mut in_channels = 3;
        for (i, (conv, &out_channels)) in self.convs.iter().zip(&config.channels).enumerate() {
            let expected = [out_channels, in_channels, KERNEL_SIZE, KERNEL_SIZE];
            check_dims(&format!("conv{}.weight", i + 1), &conv.weight.val().dims(), &expected)?;
            if let Some(bias) = &conv.bias {
                check_dims(&format!("conv{}.bias", i + 1), &bias.val().dims(), &[out_channels])?;
            }
            in_channels = out_channels;
        }

        let d = config.feature_dim().ok_or("architecture collapses the feature map")?;
        check_linear("fc1", &self.fc1, d, config.hidden_size)?;
        check_linear("fc2", &self.fc2, config.hidden_size, config.num_classes)?;
        Ok(())
    }
}

fn check_linear<B: Backend>(
    name: &str,
    layer: &LinearRecord<B>,
    d_input: usize,
    d_output: usize,
) -> Result<(), String> {
    check_dims(&format!("{}.weight", name), &layer.weight.val().dims(), &[d_input, d_output])?;
    if let Some(bias) = &layer.bias {
        check_dims(&format!("{}.bias", name), &bias.val().dims(), &[d_output])?;
    }
    Ok(())
}

fn check_dims(name: &str, actual: &[usize], expected: &[usize]) -> Result<(), String> {
    if actual != expected {
        return Err(format!("{}: shape {:?}, expected {:?}", name, actual, expected));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn small_config() -> MorphologyNetConfig {
        MorphologyNetConfig::new(4)
            .with_image_size(32)
            .with_channels(vec![2, 4])
            .with_hidden_size(8)
    }

    #[test]
    fn test_feature_dim() {
        // 32 -> 30 -> 15 -> 13 -> 6
        let config = small_config();
        assert_eq!(config.feature_map_size(), 6);
        assert_eq!(config.feature_dim(), Some(4 * 6 * 6));

        // 170 -> 168 -> 84 -> 82 -> 41 -> 39 -> 19
        let config = MorphologyNetConfig::new(4);
        assert_eq!(config.feature_map_size(), 19);
    }

    #[test]
    fn test_too_small_input_is_rejected() {
        let config = small_config().with_image_size(6);
        assert_eq!(config.feature_dim(), None);
        let result = config.init::<TestBackend>(&NdArrayDevice::Cpu);
        assert!(matches!(result, Err(ClassifyError::WeightMismatch(_))));
    }

    #[test]
    fn test_predict_proba_sums_to_one() {
        let device = NdArrayDevice::Cpu;
        let config = small_config();
        let model = config.init::<TestBackend>(&device).unwrap();
        model.clone().into_record().verify_shapes(&config).unwrap();

        let images = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        let probs = model.predict_proba(images);
        assert_eq!(probs.dims(), [2, 4]);

        let values = probs.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        for row in values.chunks(4) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
            assert!(row.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_verify_shapes_detects_other_architecture() {
        let device = NdArrayDevice::Cpu;
        let record = small_config().init::<TestBackend>(&device).unwrap().into_record();

        let wider = small_config().with_channels(vec![2, 6]);
        let err = record.verify_shapes(&wider).unwrap_err();
        assert!(err.contains("conv2.weight"), "{}", err);

        let deeper = small_config().with_channels(vec![2, 4, 4]);
        assert!(record.verify_shapes(&deeper).is_err());

        let more_classes = MorphologyNetConfig { num_classes: 3, ..small_config() };
        let err = record.verify_shapes(&more_classes).unwrap_err();
        assert!(err.contains("fc2"), "{}", err);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = small_config();
        let json = serde_json::to_string(&config).unwrap();
        let back: MorphologyNetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.channels, vec![2, 4]);
        assert_eq!(back.image_size, 32);
    }
}
