use pyrovis_gfx::error::GfxError;
use pyrovis_render_graph::error::GraphError;

#[derive(thiserror::Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// 导出给计算侧的句柄创建失败，启动阶段致命
    #[error("failed to export `{name}` to the compute side: {source}")]
    Export {
        name: String,
        #[source]
        source: GfxError,
    },
}

pub type RendererResult<T> = Result<T, RendererError>;
