use pyrovis_render_interface::vertex::Vertex;

#[derive(Debug, Default, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// 程序化生成的网格，位置直接烘焙在顶点中
pub struct GeometryGenerator;

impl GeometryGenerator {
    /// 经纬球；`tessellation` 同时是纬线与经线方向的分段数，至少为 3
    ///
    /// 两极各有一圈重合的顶点，使每个三角形都有独立的 uv
    pub fn sphere(pos: glam::Vec3, radius: f32, tessellation: u32) -> MeshData {
        debug_assert!(tessellation >= 3);
        let t = tessellation;
        let ring = t + 1;
        let mut mesh = MeshData::default();

        for lat in 1..t {
            let theta = lat as f32 * std::f32::consts::PI / t as f32;
            for lon in 0..=t {
                let phi = lon as f32 * std::f32::consts::TAU / t as f32;
                let local = glam::Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                let normal = local.normalize();
                let d_theta = glam::Vec3::new(theta.cos() * phi.cos(), -theta.sin(), theta.cos() * phi.sin());
                mesh.vertices.push(Vertex {
                    position: pos + local * radius,
                    normal,
                    uv: glam::Vec2::new(lon as f32 / t as f32, lat as f32 / t as f32),
                    tangent: -normal.cross(d_theta.normalize()),
                });
            }
        }

        let top = mesh.vertices.len() as u32;
        for (pole_y, v) in [(1.0_f32, 0.0_f32), (-1.0, 1.0)] {
            let normal = glam::Vec3::new(0.0, pole_y, 0.0);
            for lon in 0..=t {
                let phi = (lon as f32 + 0.5) * std::f32::consts::TAU / t as f32;
                mesh.vertices.push(Vertex {
                    position: pos + normal * radius,
                    normal,
                    uv: glam::Vec2::new((lon as f32 + 0.5) / t as f32, v),
                    tangent: -normal.cross(glam::Vec3::new(phi.cos(), 0.0, phi.sin())),
                });
            }
        }

        for lat in 0..t - 2 {
            for lon in 0..t {
                let first = lat * ring + lon;
                let second = first + 1;
                let third = first + ring;
                let fourth = second + ring;
                mesh.indices.extend_from_slice(&[first, second, third, second, fourth, third]);
            }
        }
        // 北极与第一圈
        for lon in 0..t {
            mesh.indices.extend_from_slice(&[top + lon, lon + 1, lon]);
        }
        // 南极与最后一圈
        let last_ring = top - ring;
        for lon in 0..t {
            mesh.indices.extend_from_slice(&[top + ring + lon, last_ring + lon, last_ring + lon + 1]);
        }

        mesh
    }

    /// 以 `pos` 为中心、边长为 `scale` 的长方体，每个面 4 个顶点
    pub fn cube(pos: glam::Vec3, scale: glam::Vec3) -> MeshData {
        use glam::Vec3;

        // (normal, u, v)，满足 u x v = normal
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];

        let mut mesh = MeshData::default();
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let local = normal * 0.5 + u * su + v * sv;
                mesh.vertices.push(Vertex {
                    position: pos + local * scale,
                    normal,
                    uv: glam::Vec2::new(su + 0.5, sv + 0.5),
                    tangent: u,
                });
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// 以 `pos` 为中心、法线为 `normal` 的矩形，`size` 为两个切向上的边长
    pub fn plane(pos: glam::Vec3, normal: glam::Vec3, size: [f32; 2]) -> MeshData {
        let normal = normal.normalize_or_zero();
        let normal = if normal == glam::Vec3::ZERO { glam::Vec3::Y } else { normal };
        let helper = if normal.y.abs() < 0.999 { glam::Vec3::Y } else { glam::Vec3::X };
        let u = helper.cross(normal).normalize();
        let v = normal.cross(u);

        let mut mesh = MeshData::default();
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            mesh.vertices.push(Vertex {
                position: pos + u * (su * size[0]) + v * (sv * size[1]),
                normal,
                uv: glam::Vec2::new(su + 0.5, sv + 0.5),
                tangent: u,
            });
        }
        mesh.indices = vec![0, 1, 2, 0, 2, 3];
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &MeshData) {
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.vertices[i as usize]);
            let face = (b.position - a.position).cross(c.position - a.position);
            assert!(face.dot(a.normal) > 0.0, "triangle {tri:?} faces inward");
        }
    }

    #[test]
    fn sphere_counts_and_indices_in_range() {
        let t = 8;
        let mesh = GeometryGenerator::sphere(glam::Vec3::new(0.0, 1.0, 0.0), 2.0, t);
        assert_eq!(mesh.vertices.len() as u32, (t + 1) * (t + 1));
        assert_eq!(mesh.indices.len() as u32, 6 * t * (t - 1));
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        for vertex in &mesh.vertices {
            let distance = (vertex.position - glam::Vec3::new(0.0, 1.0, 0.0)).length();
            assert!((distance - 2.0).abs() < 1e-4);
            assert!(vertex.normal.dot(vertex.tangent).abs() < 1e-4);
        }
    }

    #[test]
    fn cube_faces_point_outward() {
        let mesh = GeometryGenerator::cube(glam::Vec3::ZERO, glam::Vec3::new(2.0, 1.0, 1.0));
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert_outward(&mesh);
        let max_x = mesh.vertices.iter().map(|v| v.position.x).fold(f32::MIN, f32::max);
        assert_eq!(max_x, 1.0);
    }

    #[test]
    fn plane_follows_normal() {
        for normal in [glam::Vec3::Y, glam::Vec3::new(1.0, 1.0, 0.0)] {
            let mesh = GeometryGenerator::plane(glam::Vec3::ZERO, normal, [4.0, 2.0]);
            assert_outward(&mesh);
            for vertex in &mesh.vertices {
                assert!(vertex.position.dot(normal).abs() < 1e-5);
                assert!(vertex.tangent.dot(vertex.normal).abs() < 1e-5);
            }
        }
    }
}
