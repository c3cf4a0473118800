use encase::ShaderType;
use glam::Vec3;

use crate::{
    fatal,
    render::context::{BufferUsage, RenderContext},
};

use super::LIGHTS_SLOT;

/// One entry of the light storage array, 32 bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, ShaderType)]
pub struct PointLightRecord {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec3,
    pub pad: f32,
}

/// `array<PointLightRecord>` bound at slot 1. Never encoded empty: a scene
/// without lights uploads a single zeroed record.
#[derive(Debug, Default, ShaderType)]
pub struct PointLightData {
    #[size(runtime)]
    pub lights: Vec<PointLightRecord>,
}

impl PointLightData {
    pub fn new(lights: Vec<PointLightRecord>) -> Self {
        Self { lights }
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut buffer = encase::StorageBuffer::new(Vec::<u8>::new());
        let result = if self.lights.is_empty() {
            buffer.write(&Self {
                lights: vec![PointLightRecord::default()],
            })
        } else {
            buffer.write(self)
        };
        if let Err(err) = result {
            fatal!("Encoding point lights: {}", err);
        }
        buffer.into_inner()
    }

    pub fn bind(&self, ctx: &mut impl RenderContext) {
        ctx.bind_buffer(
            BufferUsage::Storage,
            LIGHTS_SLOT,
            "point_lights",
            &self.as_bytes(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let data = PointLightData::new(vec![
            PointLightRecord {
                position: Vec3::new(1.0, 2.0, 3.0),
                radius: 4.0,
                color: Vec3::new(5.0, 6.0, 7.0),
                pad: 0.0,
            },
            PointLightRecord {
                radius: 9.0,
                ..Default::default()
            },
        ]);
        let bytes = data.as_bytes();
        assert_eq!(bytes.len(), 64);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|word| f32::from_le_bytes(word.try_into().unwrap()))
            .collect();
        assert_eq!(&floats[..8], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 0.0]);
        assert_eq!(floats[11], 9.0);
    }

    #[test]
    fn test_empty_lights_encode_one_dummy() {
        let bytes = PointLightData::default().as_bytes();
        assert_eq!(bytes.len(), 32);
        assert!(bytes.iter().all(|b| *b == 0));
    }
}
