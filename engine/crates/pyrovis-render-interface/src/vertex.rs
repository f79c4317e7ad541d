use ash::vk;

/// 网格的顶点格式，shader 中的 location 与字段顺序一致
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: glam::Vec3,
    pub normal: glam::Vec3,
    pub uv: glam::Vec2,
    pub tangent: glam::Vec3,
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Self, normal)),
            attribute(2, vk::Format::R32G32_SFLOAT, std::mem::offset_of!(Self, uv)),
            attribute(3, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Self, tangent)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 44);
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(attributes[3].offset, 32);
    }
}
