use crate::{
    common::*,
    params::{DROPOUT, FC_HIDDEN, HEAD_POOL_DEPTH, HEAD_POOL_SIZE},
};
use std::borrow::Borrow;

#[derive(Debug, Clone)]
pub struct C3dInit {
    pub input_channels: i64,
    pub num_classes: i64,
    pub dropout: f64,
}

impl C3dInit {
    pub fn new(input_channels: i64, num_classes: i64) -> Self {
        Self {
            input_channels,
            num_classes,
            dropout: DROPOUT,
        }
    }

    /// Builds the C3D stack on `path` and returns its forward pass.
    ///
    /// Input is `[batch, channels, depth, height, width]`; output is raw
    /// logits `[batch, num_classes]` (softmax lives in the loss and in the
    /// video-level aggregation path). Pooling runs in ceil mode and the
    /// head adaptively pools to a fixed grid, so any clip length and
    /// resolution flattens to the same classifier input.
    pub fn build<'p, P>(self, path: P) -> Box<dyn Fn(&Tensor, bool) -> Tensor + Send>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            input_channels,
            num_classes,
            dropout,
        } = self;

        let conv_config = nn::ConvConfig {
            padding: 1,
            ..Default::default()
        };

        let conv1 = nn::conv3d(path / "conv1", input_channels, 64, 3, conv_config);
        let conv2 = nn::conv3d(path / "conv2", 64, 128, 3, conv_config);
        let conv3a = nn::conv3d(path / "conv3a", 128, 256, 3, conv_config);
        let conv3b = nn::conv3d(path / "conv3b", 256, 256, 3, conv_config);
        let conv4a = nn::conv3d(path / "conv4a", 256, 512, 3, conv_config);
        let conv4b = nn::conv3d(path / "conv4b", 512, 512, 3, conv_config);
        let conv5a = nn::conv3d(path / "conv5a", 512, 512, 3, conv_config);
        let conv5b = nn::conv3d(path / "conv5b", 512, 512, 3, conv_config);

        let fc_input = 512 * HEAD_POOL_DEPTH * HEAD_POOL_SIZE * HEAD_POOL_SIZE;
        let fc1 = nn::linear(path / "fc1", fc_input, FC_HIDDEN, Default::default());
        let fc2 = nn::linear(path / "fc2", FC_HIDDEN, FC_HIDDEN, Default::default());
        let fc3 = nn::linear(path / "fc3", FC_HIDDEN, num_classes, Default::default());

        let pool = |net: &Tensor, kernel: [i64; 3]| {
            net.max_pool3d(&kernel, &kernel, &[0, 0, 0], &[1, 1, 1], true)
        };

        Box::new(move |input: &Tensor, train: bool| {
            let mut net = input.apply(&conv1).relu();
            // the first pool keeps the temporal axis intact
            net = pool(&net, [1, 2, 2]);

            net = net.apply(&conv2).relu();
            net = pool(&net, [2, 2, 2]);

            net = net.apply(&conv3a).relu();
            net = net.apply(&conv3b).relu();
            net = pool(&net, [2, 2, 2]);

            net = net.apply(&conv4a).relu();
            net = net.apply(&conv4b).relu();
            net = pool(&net, [2, 2, 2]);

            net = net.apply(&conv5a).relu();
            net = net.apply(&conv5b).relu();
            net = pool(&net, [2, 2, 2]);

            net = net.adaptive_avg_pool3d(&[HEAD_POOL_DEPTH, HEAD_POOL_SIZE, HEAD_POOL_SIZE]);
            let batch_size = net.size()[0];
            net = net.view([batch_size, fc_input]);

            net = net.apply(&fc1).relu().dropout(dropout, train);
            net = net.apply(&fc2).relu().dropout(dropout, train);
            net.apply(&fc3)
        })
    }
}
