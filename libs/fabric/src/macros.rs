/// Declare an RPC service once and get both sides of it
///
/// Generates:
/// - an `async_trait` server trait with one method per declared call and an
///   `into_registration` method turning an `Arc` of an implementation into a
///   [`ServiceRegistration`](crate::server::ServiceRegistration);
/// - a client struct of [`MethodStub`](crate::client::MethodStub)s
///   implementing [`ClientStub`](crate::client::ClientStub), with one typed
///   async method per call.
///
/// ```no_run
/// use courier_fabric::service;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// pub struct GetByIdReq { pub id: i64 }
///
/// #[derive(Serialize, Deserialize)]
/// pub struct GetByIdResp { pub msg: String }
///
/// service! {
///     pub trait UserService, client UserClient, name "user-service" {
///         fn get_by_id(GetByIdReq) -> GetByIdResp as "GetById";
///     }
/// }
/// ```
#[macro_export]
macro_rules! service {
    (
        $(#[$attr:meta])*
        $vis:vis trait $service:ident, client $client:ident, name $name:literal {
            $(
                $(#[$method_attr:meta])*
                fn $method:ident($arg:ty) -> $ret:ty as $wire:literal;
            )*
        }
    ) => {
        $(#[$attr])*
        #[$crate::async_trait]
        $vis trait $service: Send + Sync + 'static {
            $(
                $(#[$method_attr])*
                async fn $method(&self, ctx: &$crate::CallContext, req: $arg) -> $crate::Reply<$ret>;
            )*

            /// Method table serving this implementation
            fn into_registration(
                self: ::std::sync::Arc<Self>,
            ) -> $crate::server::ServiceRegistration
            where
                Self: Sized,
            {
                $crate::server::ServiceRegistration::new($name)
                $(
                    .method($wire, {
                        let this = self.clone();
                        move |ctx: $crate::CallContext, req: $arg| {
                            let this = this.clone();
                            async move { this.$method(&ctx, req).await }
                        }
                    })
                )*
            }
        }

        #[derive(Clone, Debug)]
        $vis struct $client {
            $( $method: $crate::client::MethodStub<$arg, $ret>, )*
        }

        impl $client {
            $(
                $(#[$method_attr])*
                pub async fn $method(
                    &self,
                    ctx: &$crate::CallContext,
                    req: &$arg,
                ) -> $crate::Reply<$ret> {
                    self.$method.call(ctx, req).await
                }
            )*
        }

        impl $crate::client::ClientStub for $client {
            fn descriptor() -> $crate::client::ServiceDescriptor {
                $crate::client::ServiceDescriptor {
                    name: $name,
                    methods: &[$($wire),*],
                }
            }

            fn bind(binding: &$crate::client::Binding<'_>) -> Self {
                Self {
                    $( $method: binding.method($wire), )*
                }
            }
        }
    };
}
